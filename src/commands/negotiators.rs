use axum::extract::Query;
use axum::Json;
use serde::Deserialize;

use crate::core::catalog::{self, NegotiatorInfo};

#[derive(Debug, Default, Deserialize)]
pub struct NegotiatorQuery {
    pub group: Option<String>,
}

pub async fn list_negotiators(Query(query): Query<NegotiatorQuery>) -> Json<Vec<&'static NegotiatorInfo>> {
    Json(catalog::list_negotiators(query.group.as_deref()))
}
