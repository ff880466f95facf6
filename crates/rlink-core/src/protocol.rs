//! Command/result protocol.
//!
//! Every command is wrapped in an R template that traps warnings and errors
//! into a two-field result record and always PUTs that record, as JSON, to the
//! endpoint under [`ProtocolConfig::RESULT_KEY`]. [`execute`] writes the
//! wrapped command and waits on that key.
//!
//! Result wire shape: `{"Warning": "<message or empty>", "Error": "<message or empty>"}`.

use crate::config::{EndpointConfig, ProtocolConfig};
use crate::endpoint::EndpointHandle;
use crate::interpreter::Interpreter;
use crate::{Result, RlinkError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Outcome record delivered by the command template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResultRecord {
    #[serde(rename = "Warning")]
    pub warning: String,
    #[serde(rename = "Error")]
    pub error: String,
}

impl ResultRecord {
    /// Decode a delivered record. Only a JSON object with exactly both
    /// fields is accepted; a derived struct would also take an array.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(bytes)
            .map_err(|e| RlinkError::decode("command result", e))?;
        serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| RlinkError::decode("command result", e))
    }

    /// Classify the record. An error wins over a warning.
    pub fn into_result(self) -> Result<()> {
        if !self.error.is_empty() {
            Err(RlinkError::Interpreter(self.error))
        } else if !self.warning.is_empty() {
            Err(RlinkError::InterpreterWarning(self.warning))
        } else {
            Ok(())
        }
    }
}

/// Wrap `command` in the trapping template that reports to `result_url`.
pub fn render_command(command: &str, result_url: &str) -> String {
    let ret = ProtocolConfig::RESULT_VAR;
    format!(
        "{ret} <- list(Warning = \"\", Error = \"\")\n\
         tryCatch({{\n\
         {command}\n\
         }}, warning = function(w) {{\n\
         \t{ret}$Warning <<- conditionMessage(w)\n\
         }}, error = function(e) {{\n\
         \t{ret}$Error <<- conditionMessage(e)\n\
         }})\n\
         invisible(httpPUT(\"{result_url}\", toJSON({ret}, auto_unbox = TRUE)))\n"
    )
}

/// Command assigning the JSON blob at `url` to `name`.
pub fn fetch_command(name: &str, url: &str) -> String {
    format!("{name} <- fromJSON(getURL(\"{url}\"))")
}

/// Command PUTting `name`, JSON-encoded, to `url`.
pub fn deliver_command(name: &str, url: &str) -> String {
    format!("invisible(httpPUT(\"{url}\", toJSON({name}, digits = NA)))")
}

/// Command building the data.frame `name` from a table blob at `url`.
pub fn fetch_table_command(name: &str, url: &str) -> String {
    let tbl = ProtocolConfig::TABLE_SCRATCH_VAR;
    format!(
        "{tbl} <- fromJSON(getURL(\"{url}\"), simplifyVector = FALSE)\n\
         {name} <- as.data.frame(setNames(lapply({tbl}$cols, function(col) {{\n\
         \tv <- unlist(col$val)\n\
         \tswitch(col$dtype,\n\
         \t\tstring = as.character(v),\n\
         \t\tbool = as.logical(v),\n\
         \t\tint8 = , int16 = , int32 = , uint8 = , uint16 = as.integer(v),\n\
         \t\tas.numeric(v))\n\
         }}), unlist({tbl}$colNames)), stringsAsFactors = FALSE, check.names = FALSE)\n\
         if (!isTRUE({tbl}$namelessRows) && length({tbl}$rowNames) > 0) rownames({name}) <- unlist({tbl}$rowNames)\n\
         rm({tbl})"
    )
}

/// Command PUTting the data.frame `name` to `url` in table wire shape.
///
/// Character and factor columns become `string`, logical `bool`, integer
/// `int32` and everything else `float64`. Automatic row names map to
/// nameless rows.
pub fn deliver_table_command(name: &str, url: &str) -> String {
    let tbl = ProtocolConfig::TABLE_SCRATCH_VAR;
    format!(
        "{tbl} <- as.data.frame({name}, stringsAsFactors = FALSE)\n\
         invisible(httpPUT(\"{url}\", toJSON(list(\n\
         \tcols = unname(lapply({tbl}, function(v) list(\n\
         \t\tdtype = if (length(v) == 0) \"empty\" else if (is.character(v) || is.factor(v)) \"string\" else if (is.logical(v)) \"bool\" else if (is.integer(v) && !is.factor(v)) \"int32\" else \"float64\",\n\
         \t\tval = I(if (is.factor(v)) as.character(v) else v)))),\n\
         \tcolNames = I(names({tbl})),\n\
         \trowNames = if (.row_names_info({tbl}) < 0) NULL else I(rownames({tbl})),\n\
         \tnamelessRows = .row_names_info({tbl}) < 0\n\
         ), auto_unbox = TRUE, digits = NA, null = \"null\")))\n\
         rm({tbl})"
    )
}

/// R words that cannot be assigned to.
const RESERVED_WORDS: &[&str] = &[
    "if", "else", "repeat", "while", "function", "for", "in", "next", "break", "TRUE", "FALSE",
    "NULL", "Inf", "NaN", "NA", "NA_integer_", "NA_real_", "NA_character_", "NA_complex_",
];

/// Syntactic R names: a letter, or a dot not followed by a digit, then
/// letters, digits, dots and underscores.
static R_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z][A-Za-z0-9._]*|\.(?:[A-Za-z._][A-Za-z0-9._]*)?)$").unwrap()
});

/// Check that `name` can be used as an R variable in generated commands.
pub fn validate_name(name: &str) -> Result<()> {
    if !R_NAME.is_match(name) || RESERVED_WORDS.contains(&name) {
        return Err(RlinkError::Validation {
            field: "name".to_string(),
            message: format!("{:?} is not a syntactic R variable name", name),
        });
    }
    Ok(())
}

/// Run `command` in the interpreter and wait for its classified outcome.
///
/// Only one command may be in flight per endpoint: the result key is fixed.
/// The result slot is released on every return path.
pub async fn execute(
    endpoint: &EndpointHandle,
    interpreter: &mut dyn Interpreter,
    command: &str,
) -> Result<()> {
    let mut slot = endpoint.rendezvous().register(ProtocolConfig::RESULT_KEY);
    let text = render_command(command, &endpoint.url_for(ProtocolConfig::RESULT_KEY));

    debug!("Running command: {}", command);
    interpreter.write_input(&text).await?;

    let delivery = slot.wait().await?;
    let bytes = delivery
        .read_to_end(EndpointConfig::MAX_DELIVERY_BYTES)
        .await?;

    let result = ResultRecord::decode(&bytes)?.into_result();
    if let Err(RlinkError::InterpreterWarning(message)) = &result {
        warn!("R warning: {}", message);
    }
    result
}
