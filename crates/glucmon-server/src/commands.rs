//! Slash commands: definitions, parsing and execution.

use chrono::Duration;
use glucmon_common::types::{DoseCategory, Visibility};
use glucmon_notify::interaction::CommandData;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::mutation::{
    AmountChange, DoseEdit, IntakeEdit, MutationError, MutationHandler, MutationOutcome,
};
use crate::report::{ReportError, ReportGenerator, Timeframe};

// Application command option types.
const OPT_STRING: u8 = 3;
const OPT_INTEGER: u8 = 4;
const OPT_NUMBER: u8 = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Carbs { amount: f64 },
    Insulin { category: DoseCategory, units: f64 },
    EditCarbs(IntakeEdit),
    EditInsulin(DoseEdit),
    EditVis(Visibility),
    GenReport { timeframe: Timeframe, offset: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("missing option '{0}'")]
    MissingOption(&'static str),

    #[error("invalid value '{value}' for option '{name}'")]
    InvalidOption { name: &'static str, value: String },

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error(transparent)]
    Report(#[from] ReportError),
}

fn required_f64(data: &CommandData, name: &'static str) -> Result<f64, CommandError> {
    match data.option(name) {
        None => Err(CommandError::MissingOption(name)),
        Some(raw) => data.f64_option(name).ok_or_else(|| CommandError::InvalidOption {
            name,
            value: raw.to_string(),
        }),
    }
}

fn optional_f64(data: &CommandData, name: &'static str) -> Result<Option<f64>, CommandError> {
    match data.option(name) {
        None => Ok(None),
        Some(_) => required_f64(data, name).map(Some),
    }
}

fn required_str(data: &CommandData, name: &'static str) -> Result<String, CommandError> {
    data.str_option(name).ok_or(CommandError::MissingOption(name))
}

fn parse_with<T, F>(data: &CommandData, name: &'static str, parse: F) -> Result<Option<T>, CommandError>
where
    F: FnOnce(&str) -> Option<T>,
{
    let Some(raw) = data.str_option(name) else {
        return Ok(None);
    };
    parse(&raw)
        .map(Some)
        .ok_or(CommandError::InvalidOption { name, value: raw })
}

/// Minute offset option, as a duration.
fn offset_option(data: &CommandData) -> Result<Option<Duration>, CommandError> {
    match data.option("offset") {
        None => Ok(None),
        Some(raw) => data
            .i64_option("offset")
            .and_then(Duration::try_minutes)
            .map(Some)
            .ok_or_else(|| CommandError::InvalidOption {
                name: "offset",
                value: raw.to_string(),
            }),
    }
}

/// Negative amounts delete the entry.
pub fn amount_change(value: Option<f64>) -> AmountChange {
    match value {
        None => AmountChange::Keep,
        Some(v) if v < 0.0 => AmountChange::Delete,
        Some(v) => AmountChange::Set(v),
    }
}

impl Command {
    pub fn parse(data: &CommandData) -> Result<Self, CommandError> {
        match data.name.as_str() {
            "carbs" => Ok(Self::Carbs {
                amount: required_f64(data, "amount")?,
            }),
            "insulin" => Ok(Self::Insulin {
                category: parse_with(data, "type", |s| s.parse().ok())?
                    .ok_or(CommandError::MissingOption("type"))?,
                units: required_f64(data, "units")?,
            }),
            "editcarbs" => Ok(Self::EditCarbs(IntakeEdit {
                reference: required_str(data, "id")?,
                amount: amount_change(optional_f64(data, "amount")?),
                offset: offset_option(data)?,
            })),
            "editinsulin" => Ok(Self::EditInsulin(DoseEdit {
                reference: required_str(data, "id")?,
                category: parse_with(data, "type", |s| s.parse().ok())?,
                amount: amount_change(optional_f64(data, "units")?),
                offset: offset_option(data)?,
            })),
            "editvis" => Ok(Self::EditVis(
                parse_with(data, "vis", |s| s.parse().ok())?
                    .ok_or(CommandError::MissingOption("vis"))?,
            )),
            "genreport" => {
                let timeframe = parse_with(data, "time", |s| s.parse().ok())?
                    .ok_or(CommandError::MissingOption("time"))?;
                let offset = match data.option("offset") {
                    None => 0,
                    Some(raw) => data
                        .i64_option("offset")
                        .and_then(|v| u32::try_from(v).ok())
                        .ok_or_else(|| CommandError::InvalidOption {
                            name: "offset",
                            value: raw.to_string(),
                        })?,
                };
                Ok(Self::GenReport { timeframe, offset })
            }
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Carbs { .. } => "carbs",
            Self::Insulin { .. } => "insulin",
            Self::EditCarbs(_) => "editcarbs",
            Self::EditInsulin(_) => "editinsulin",
            Self::EditVis(_) => "editvis",
            Self::GenReport { .. } => "genreport",
        }
    }
}

pub struct CommandHandler {
    mutations: Arc<MutationHandler>,
    reports: Arc<ReportGenerator>,
}

impl CommandHandler {
    pub fn new(mutations: Arc<MutationHandler>, reports: Arc<ReportGenerator>) -> Self {
        Self { mutations, reports }
    }

    /// Runs a command and returns the reply shown to the user.
    pub async fn execute(&self, command: Command) -> Result<String, CommandError> {
        let name = command.name();
        let reply = match command {
            Command::Carbs { amount } => describe(self.mutations.add_intake(amount).await?),
            Command::Insulin { category, units } => {
                describe(self.mutations.add_dose(category, units).await?)
            }
            Command::EditCarbs(edit) => describe(self.mutations.edit_intake(edit).await?),
            Command::EditInsulin(edit) => describe(self.mutations.edit_dose(edit).await?),
            Command::EditVis(visibility) => {
                self.mutations.set_visibility(visibility).await;
                format!("visibility set to {visibility}")
            }
            Command::GenReport { timeframe, offset } => {
                let window = self.reports.generate(timeframe, offset).await?;
                format!("report {} posted", window.title())
            }
        };
        tracing::info!(command = name, reply = %reply, "Command executed");
        Ok(reply)
    }
}

fn describe(outcome: MutationOutcome) -> String {
    match outcome {
        MutationOutcome::Added { id } => format!("logged {id}"),
        MutationOutcome::Updated { id } => format!("updated {id}"),
        MutationOutcome::Deleted { id } => format!("deleted {id}"),
    }
}

fn option(kind: u8, name: &str, description: &str, required: bool) -> Value {
    json!({ "type": kind, "name": name, "description": description, "required": required })
}

fn with_min(mut opt: Value, min: f64) -> Value {
    opt["min_value"] = json!(min);
    opt
}

fn with_choices(mut opt: Value, choices: &[(&str, &str)]) -> Value {
    opt["choices"] = choices
        .iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();
    opt
}

/// Command definitions registered with the chat platform.
pub fn definitions() -> Vec<Value> {
    let insulin_types = [("rapid", "rapid"), ("slow", "slow")];
    let command = |name: &str, description: &str, options: Vec<Value>| {
        json!({ "name": name, "description": description, "type": 1, "options": options })
    };

    vec![
        command(
            "carbs",
            "Log carbohydrates",
            vec![with_min(option(OPT_NUMBER, "amount", "grams of carbs", true), 0.0)],
        ),
        command(
            "editcarbs",
            "Edit or delete (negative amount) a carbs entry",
            vec![
                option(OPT_STRING, "id", "entry id or short reference", true),
                option(OPT_NUMBER, "amount", "new amount; negative deletes", false),
                option(OPT_INTEGER, "offset", "minutes to shift the entry by", false),
            ],
        ),
        command(
            "insulin",
            "Log an insulin dose",
            vec![
                with_choices(option(OPT_STRING, "type", "insulin type", true), &insulin_types),
                with_min(option(OPT_NUMBER, "units", "units injected", true), 0.0),
            ],
        ),
        command(
            "editinsulin",
            "Edit or delete (negative units) an insulin entry",
            vec![
                option(OPT_STRING, "id", "entry id or short reference", true),
                with_choices(option(OPT_STRING, "type", "insulin type", false), &insulin_types),
                option(OPT_NUMBER, "units", "new units; negative deletes", false),
                option(OPT_INTEGER, "offset", "minutes to shift the entry by", false),
            ],
        ),
        command(
            "editvis",
            "Choose which entries the live display lists",
            vec![with_choices(
                option(OPT_STRING, "vis", "visibility", true),
                &[("all", "all"), ("carbs", "carb"), ("insulin", "insulin")],
            )],
        ),
        command(
            "genreport",
            "Post a weekly or monthly report",
            vec![
                with_choices(
                    option(OPT_STRING, "time", "timeframe", true),
                    &[("week", "w"), ("month", "m")],
                ),
                with_min(option(OPT_INTEGER, "offset", "periods back, 0 is current", false), 0.0),
            ],
        ),
    ]
}
