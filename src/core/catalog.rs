//! Negotiators the `negotiate` command knows about, as offered to the front
//! end. Names are what `--negotiator` accepts.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NegotiatorGroup {
    TimeBased,
    Tit4Tat,
    Simple,
    Learning,
}

#[derive(Debug, Clone, Serialize)]
pub struct NegotiatorInfo {
    pub name: &'static str,
    pub type_name: &'static str,
    pub group: NegotiatorGroup,
    pub description: &'static str,
}

const fn entry(
    name: &'static str,
    type_name: &'static str,
    group: NegotiatorGroup,
    description: &'static str,
) -> NegotiatorInfo {
    NegotiatorInfo {
        name,
        type_name,
        group,
        description,
    }
}

pub static NEGOTIATORS: &[NegotiatorInfo] = &[
    entry(
        "AspirationNegotiator",
        "negmas.sao.negotiators.AspirationNegotiator",
        NegotiatorGroup::TimeBased,
        "Concedes along an aspiration curve over the negotiation time",
    ),
    entry(
        "BoulwareTBNegotiator",
        "negmas.sao.negotiators.BoulwareTBNegotiator",
        NegotiatorGroup::TimeBased,
        "Time-based, concedes slowly until close to the deadline",
    ),
    entry(
        "ConcederTBNegotiator",
        "negmas.sao.negotiators.ConcederTBNegotiator",
        NegotiatorGroup::TimeBased,
        "Time-based, concedes quickly early on",
    ),
    entry(
        "LinearTBNegotiator",
        "negmas.sao.negotiators.LinearTBNegotiator",
        NegotiatorGroup::TimeBased,
        "Time-based, concedes linearly",
    ),
    entry(
        "NaiveTitForTatNegotiator",
        "negmas.sao.negotiators.NaiveTitForTatNegotiator",
        NegotiatorGroup::Tit4Tat,
        "Mirrors the opponent's concessions",
    ),
    entry(
        "SimpleTitForTatNegotiator",
        "negmas.sao.negotiators.SimpleTitForTatNegotiator",
        NegotiatorGroup::Tit4Tat,
        "Mirrors the opponent's last concession",
    ),
    entry(
        "MiCRONegotiator",
        "negmas.sao.negotiators.MiCRONegotiator",
        NegotiatorGroup::Tit4Tat,
        "Concedes only when the opponent makes new offers",
    ),
    entry(
        "ToughNegotiator",
        "negmas.sao.negotiators.ToughNegotiator",
        NegotiatorGroup::Simple,
        "Only ever offers its best outcome",
    ),
    entry(
        "NiceNegotiator",
        "negmas.sao.negotiators.NiceNegotiator",
        NegotiatorGroup::Simple,
        "Accepts any offer",
    ),
    entry(
        "TopFractionNegotiator",
        "negmas.sao.negotiators.TopFractionNegotiator",
        NegotiatorGroup::Simple,
        "Offers and accepts only within its top outcomes",
    ),
    entry(
        "RandomNegotiator",
        "negmas.sao.negotiators.RandomNegotiator",
        NegotiatorGroup::Simple,
        "Random offers and responses",
    ),
    entry(
        "CABNegotiator",
        "negmas.gb.negotiators.CABNegotiator",
        NegotiatorGroup::Learning,
        "Conceding accepting better, adapts to offers it has seen",
    ),
];

pub fn list_negotiators(group: Option<&str>) -> Vec<&'static NegotiatorInfo> {
    NEGOTIATORS
        .iter()
        .filter(|info| match group {
            Some(wanted) => group_name(info.group) == wanted,
            None => true,
        })
        .collect()
}

pub fn find_negotiator(name: &str) -> Option<&'static NegotiatorInfo> {
    NEGOTIATORS
        .iter()
        .find(|info| info.name.eq_ignore_ascii_case(name) || info.type_name == name)
}

fn group_name(group: NegotiatorGroup) -> &'static str {
    match group {
        NegotiatorGroup::TimeBased => "time-based",
        NegotiatorGroup::Tit4Tat => "tit4tat",
        NegotiatorGroup::Simple => "simple",
        NegotiatorGroup::Learning => "learning",
    }
}
