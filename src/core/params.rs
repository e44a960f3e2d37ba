//! Negotiation run options and their translation into `negotiate` CLI flags.
//!
//! The whole flag contract lives in [`FLAG_TABLE`]: one row per option,
//! declared in group order and, within a group, in field order. Adding an
//! option means adding a field and a row.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PROTOCOL: &str = "SAO";
pub const DEFAULT_SAVE_TYPE: &str = "yml";

/// Options for a single negotiation run, as sent by the front end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NegotiationParams {
    // basic
    pub protocol: String,
    pub negotiators: Vec<String>,
    pub negotiator_params: Vec<String>,
    pub mechanism_params: Vec<String>,
    pub extend_negotiators: bool,

    // deadline
    pub steps: Option<u64>,
    pub time_limit: Option<f64>,
    pub step_time_limit: Option<f64>,
    pub negotiator_time_limit: Option<f64>,

    // scenario
    pub scenario: Option<String>,
    pub normalize: bool,
    pub reserved_values: Vec<f64>,
    pub ignore_discount: bool,
    pub ignore_reserved: bool,

    // generated scenario
    pub generator: Option<String>,
    pub issues: Option<u32>,
    pub values: Option<u32>,
    pub size: Option<u64>,

    // output
    pub verbose: bool,
    pub progress: bool,
    pub history: bool,
    pub stats: bool,
    pub raise_exceptions: bool,

    // plotting
    pub plot: bool,
    /// Accepted for compatibility; the CLI always gets `--no-plot-show`.
    pub plot_show: bool,
    pub plot_path: Option<String>,
    pub only2d: bool,
    pub simple_offers_only: bool,

    // saving
    pub save_path: Option<String>,
    pub save_history: bool,
    pub save_stats: bool,
    pub save_type: String,
    pub save_compact: bool,

    // advanced
    pub seed: Option<u64>,
    pub fast: bool,
}

impl Default for NegotiationParams {
    fn default() -> Self {
        Self {
            protocol: DEFAULT_PROTOCOL.to_string(),
            negotiators: Vec::new(),
            negotiator_params: Vec::new(),
            mechanism_params: Vec::new(),
            extend_negotiators: false,
            steps: None,
            time_limit: None,
            step_time_limit: None,
            negotiator_time_limit: None,
            scenario: None,
            normalize: true,
            reserved_values: Vec::new(),
            ignore_discount: false,
            ignore_reserved: false,
            generator: None,
            issues: None,
            values: None,
            size: None,
            verbose: false,
            progress: false,
            history: true,
            stats: true,
            raise_exceptions: false,
            plot: false,
            plot_show: false,
            plot_path: None,
            only2d: false,
            simple_offers_only: false,
            save_path: None,
            save_history: true,
            save_stats: true,
            save_type: DEFAULT_SAVE_TYPE.to_string(),
            save_compact: true,
            seed: None,
            fast: false,
        }
    }
}

impl NegotiationParams {
    /// Ordered argument list for the `negotiate` command.
    pub fn to_cli_args(&self) -> Vec<String> {
        let saving = self.has_save_path();
        let mut args = Vec::new();
        for rule in FLAG_TABLE {
            if rule.group == FlagGroup::Saving && !saving {
                continue;
            }
            rule.emit(self, &mut args);
        }
        args
    }

    pub fn has_save_path(&self) -> bool {
        self.save_path
            .as_deref()
            .is_some_and(|path| !path.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// Flag table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FlagGroup {
    Basic,
    Deadline,
    Scenario,
    GeneratedScenario,
    Output,
    Plotting,
    Saving,
    Advanced,
}

enum Emission {
    /// `--flag value` when the accessor yields a value.
    Value(fn(&NegotiationParams) -> Option<String>),
    /// One `--flag value` pair per non-empty element.
    Each(fn(&NegotiationParams) -> Vec<String>),
    /// Bare `--flag` only when true.
    Switch(fn(&NegotiationParams) -> bool),
    /// Always one of `--flag` / `negated`.
    Toggle {
        negated: &'static str,
        get: fn(&NegotiationParams) -> bool,
    },
    /// Emitted unconditionally.
    Forced,
}

struct FlagRule {
    group: FlagGroup,
    field: &'static str,
    flag: &'static str,
    emission: Emission,
}

impl FlagRule {
    fn emit(&self, params: &NegotiationParams, args: &mut Vec<String>) {
        match &self.emission {
            Emission::Value(get) => {
                if let Some(value) = get(params) {
                    args.push(self.flag.to_string());
                    args.push(value);
                }
            }
            Emission::Each(get) => {
                for value in get(params) {
                    if value.trim().is_empty() {
                        continue;
                    }
                    args.push(self.flag.to_string());
                    args.push(value);
                }
            }
            Emission::Switch(get) => {
                if get(params) {
                    args.push(self.flag.to_string());
                }
            }
            Emission::Toggle { negated, get } => {
                let flag = if get(params) { self.flag } else { negated };
                args.push(flag.to_string());
            }
            Emission::Forced => args.push(self.flag.to_string()),
        }
    }
}

fn text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn number<T: ToString>(value: Option<T>) -> Option<String> {
    value.map(|v| v.to_string())
}

static FLAG_TABLE: &[FlagRule] = &[
    // basic
    FlagRule {
        group: FlagGroup::Basic,
        field: "protocol",
        flag: "--protocol",
        emission: Emission::Value(|p| {
            let protocol = p.protocol.trim();
            (!protocol.is_empty() && !protocol.eq_ignore_ascii_case(DEFAULT_PROTOCOL))
                .then(|| protocol.to_string())
        }),
    },
    FlagRule {
        group: FlagGroup::Basic,
        field: "negotiators",
        flag: "--negotiator",
        emission: Emission::Each(|p| p.negotiators.clone()),
    },
    FlagRule {
        group: FlagGroup::Basic,
        field: "negotiator_params",
        flag: "--negotiator-params",
        emission: Emission::Each(|p| p.negotiator_params.clone()),
    },
    FlagRule {
        group: FlagGroup::Basic,
        field: "mechanism_params",
        flag: "--params",
        emission: Emission::Each(|p| p.mechanism_params.clone()),
    },
    FlagRule {
        group: FlagGroup::Basic,
        field: "extend_negotiators",
        flag: "--extend-negotiators",
        emission: Emission::Switch(|p| p.extend_negotiators),
    },
    // deadline
    FlagRule {
        group: FlagGroup::Deadline,
        field: "steps",
        flag: "--steps",
        emission: Emission::Value(|p| number(p.steps)),
    },
    FlagRule {
        group: FlagGroup::Deadline,
        field: "time_limit",
        flag: "--time",
        emission: Emission::Value(|p| number(p.time_limit)),
    },
    FlagRule {
        group: FlagGroup::Deadline,
        field: "step_time_limit",
        flag: "--step-time",
        emission: Emission::Value(|p| number(p.step_time_limit)),
    },
    FlagRule {
        group: FlagGroup::Deadline,
        field: "negotiator_time_limit",
        flag: "--negotiator-time",
        emission: Emission::Value(|p| number(p.negotiator_time_limit)),
    },
    // scenario
    FlagRule {
        group: FlagGroup::Scenario,
        field: "scenario",
        flag: "--scenario",
        emission: Emission::Value(|p| text(&p.scenario)),
    },
    FlagRule {
        group: FlagGroup::Scenario,
        field: "normalize",
        flag: "--normalize",
        emission: Emission::Toggle {
            negated: "--no-normalize",
            get: |p| p.normalize,
        },
    },
    FlagRule {
        group: FlagGroup::Scenario,
        field: "reserved_values",
        flag: "--reserved",
        emission: Emission::Each(|p| p.reserved_values.iter().map(f64::to_string).collect()),
    },
    FlagRule {
        group: FlagGroup::Scenario,
        field: "ignore_discount",
        flag: "--ignore-discount",
        emission: Emission::Switch(|p| p.ignore_discount),
    },
    FlagRule {
        group: FlagGroup::Scenario,
        field: "ignore_reserved",
        flag: "--ignore-reserved",
        emission: Emission::Switch(|p| p.ignore_reserved),
    },
    // generated scenario
    FlagRule {
        group: FlagGroup::GeneratedScenario,
        field: "generator",
        flag: "--generator",
        emission: Emission::Value(|p| text(&p.generator)),
    },
    FlagRule {
        group: FlagGroup::GeneratedScenario,
        field: "issues",
        flag: "--issues",
        emission: Emission::Value(|p| number(p.issues)),
    },
    FlagRule {
        group: FlagGroup::GeneratedScenario,
        field: "values",
        flag: "--values",
        emission: Emission::Value(|p| number(p.values)),
    },
    FlagRule {
        group: FlagGroup::GeneratedScenario,
        field: "size",
        flag: "--size",
        emission: Emission::Value(|p| number(p.size)),
    },
    // output
    FlagRule {
        group: FlagGroup::Output,
        field: "verbose",
        flag: "--verbose",
        emission: Emission::Switch(|p| p.verbose),
    },
    FlagRule {
        group: FlagGroup::Output,
        field: "progress",
        flag: "--progress",
        emission: Emission::Switch(|p| p.progress),
    },
    FlagRule {
        group: FlagGroup::Output,
        field: "history",
        flag: "--history",
        emission: Emission::Toggle {
            negated: "--no-history",
            get: |p| p.history,
        },
    },
    FlagRule {
        group: FlagGroup::Output,
        field: "stats",
        flag: "--stats",
        emission: Emission::Toggle {
            negated: "--no-stats",
            get: |p| p.stats,
        },
    },
    FlagRule {
        group: FlagGroup::Output,
        field: "raise_exceptions",
        flag: "--raise-exceptions",
        emission: Emission::Switch(|p| p.raise_exceptions),
    },
    // plotting
    FlagRule {
        group: FlagGroup::Plotting,
        field: "plot",
        flag: "--plot",
        emission: Emission::Switch(|p| p.plot),
    },
    FlagRule {
        group: FlagGroup::Plotting,
        field: "plot_show",
        flag: "--no-plot-show",
        emission: Emission::Forced,
    },
    FlagRule {
        group: FlagGroup::Plotting,
        field: "plot_path",
        flag: "--plot-path",
        emission: Emission::Value(|p| text(&p.plot_path)),
    },
    FlagRule {
        group: FlagGroup::Plotting,
        field: "only2d",
        flag: "--only2d",
        emission: Emission::Switch(|p| p.only2d),
    },
    FlagRule {
        group: FlagGroup::Plotting,
        field: "simple_offers_only",
        flag: "--simple-offers-only",
        emission: Emission::Switch(|p| p.simple_offers_only),
    },
    // saving (skipped as a group without a save path)
    FlagRule {
        group: FlagGroup::Saving,
        field: "save_path",
        flag: "--save-path",
        emission: Emission::Value(|p| text(&p.save_path)),
    },
    FlagRule {
        group: FlagGroup::Saving,
        field: "save_history",
        flag: "--save-history",
        emission: Emission::Toggle {
            negated: "--no-save-history",
            get: |p| p.save_history,
        },
    },
    FlagRule {
        group: FlagGroup::Saving,
        field: "save_stats",
        flag: "--save-stats",
        emission: Emission::Toggle {
            negated: "--no-save-stats",
            get: |p| p.save_stats,
        },
    },
    FlagRule {
        group: FlagGroup::Saving,
        field: "save_type",
        flag: "--save-type",
        emission: Emission::Value(|p| {
            let save_type = p.save_type.trim();
            (!save_type.is_empty() && save_type != DEFAULT_SAVE_TYPE)
                .then(|| save_type.to_string())
        }),
    },
    FlagRule {
        group: FlagGroup::Saving,
        field: "save_compact",
        flag: "--save-compact",
        emission: Emission::Toggle {
            negated: "--no-save-compact",
            get: |p| p.save_compact,
        },
    },
    // advanced
    FlagRule {
        group: FlagGroup::Advanced,
        field: "seed",
        flag: "--seed",
        emission: Emission::Value(|p| number(p.seed)),
    },
    FlagRule {
        group: FlagGroup::Advanced,
        field: "fast",
        flag: "--fast",
        emission: Emission::Switch(|p| p.fast),
    },
];
