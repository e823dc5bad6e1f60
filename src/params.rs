use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::trace;

use crate::driver::{CallableStatement, PreparedStatement};
use crate::error::SqlPoolError;
use crate::types::{RowValues, SqlDataType};

/// One stored-procedure parameter, in placeholder order.
///
/// Serializes to the descriptor shape hosts exchange:
/// `{"type":"in","value":..}` or `{"type":"out","fieldName":..,"dataType":..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProcedureParameter {
    #[serde(rename = "in")]
    Input { value: RowValues },
    #[serde(rename = "out", rename_all = "camelCase")]
    Output {
        field_name: String,
        data_type: SqlDataType,
    },
}

impl ProcedureParameter {
    pub fn input(value: impl Into<RowValues>) -> Self {
        Self::Input {
            value: value.into(),
        }
    }

    pub fn output(data_type: SqlDataType, field_name: impl Into<String>) -> Self {
        Self::Output {
            field_name: field_name.into(),
            data_type,
        }
    }

    /// Parse an untyped descriptor, rejecting unknown direction tags.
    ///
    /// `position` is the 1-based placeholder the descriptor is destined for
    /// and is reported in errors. `dataType` may be a type name or a JDBC
    /// numeric code.
    ///
    /// # Errors
    /// `SqlPoolError::InvalidParameterType` for a missing or unknown `type`,
    /// `SqlPoolError::Config` for an output descriptor missing its name or type.
    pub fn from_json(position: usize, descriptor: &JsonValue) -> Result<Self, SqlPoolError> {
        let tag = descriptor.get("type").and_then(JsonValue::as_str);
        match tag {
            Some("in") => {
                let value = match descriptor.get("value") {
                    None | Some(JsonValue::Null) => RowValues::Null,
                    Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
                        SqlPoolError::Config(format!(
                            "input parameter {position} has an unsupported value: {e}"
                        ))
                    })?,
                };
                Ok(Self::Input { value })
            }
            Some("out") => {
                let field_name = descriptor
                    .get("fieldName")
                    .and_then(JsonValue::as_str)
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| {
                        SqlPoolError::Config(format!(
                            "output parameter {position} is missing fieldName"
                        ))
                    })?;
                let data_type = match descriptor.get("dataType") {
                    Some(JsonValue::String(name)) => SqlDataType::from_name(name),
                    Some(JsonValue::Number(code)) => code
                        .as_i64()
                        .and_then(|c| i32::try_from(c).ok())
                        .and_then(SqlDataType::from_jdbc_code),
                    _ => None,
                }
                .ok_or_else(|| {
                    SqlPoolError::Config(format!(
                        "output parameter {position} has a missing or unknown dataType"
                    ))
                })?;
                Ok(Self::Output {
                    field_name: field_name.to_string(),
                    data_type,
                })
            }
            other => Err(SqlPoolError::InvalidParameterType {
                position,
                tag: other.map_or_else(|| descriptor.to_string(), str::to_string),
            }),
        }
    }

    /// Parse a whole descriptor list, numbering positions from 1.
    ///
    /// # Errors
    /// The first descriptor that fails [`from_json`](Self::from_json).
    pub fn list_from_json(descriptors: &[JsonValue]) -> Result<Vec<Self>, SqlPoolError> {
        descriptors
            .iter()
            .enumerate()
            .map(|(idx, d)| Self::from_json(idx + 1, d))
            .collect()
    }
}

/// An output parameter registered on a callable statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OutputSlot<'p> {
    pub position: usize,
    pub field_name: &'p str,
}

/// Bind positional values onto a prepared statement, 1-based.
///
/// # Errors
/// `SqlPoolError::ParameterBinding` for the first value the driver rejects.
pub async fn bind_params(
    stmt: &mut (dyn PreparedStatement + '_),
    params: &[RowValues],
) -> Result<(), SqlPoolError> {
    for (idx, value) in params.iter().enumerate() {
        let position = idx + 1;
        trace!(position, "binding parameter");
        stmt.bind(position, value)
            .await
            .map_err(|source| SqlPoolError::ParameterBinding { position, source })?;
    }
    Ok(())
}

/// Bind inputs and register outputs on a callable statement.
///
/// Returns the output slots in declaration order so their values can be
/// read back after execution.
///
/// # Errors
/// `SqlPoolError::ParameterBinding` for the first input or output the driver rejects.
pub(crate) async fn bind_procedure_params<'p>(
    stmt: &mut (dyn CallableStatement + '_),
    params: &'p [ProcedureParameter],
) -> Result<Vec<OutputSlot<'p>>, SqlPoolError> {
    let mut outputs = Vec::new();
    for (idx, param) in params.iter().enumerate() {
        let position = idx + 1;
        match param {
            ProcedureParameter::Input { value } => {
                trace!(position, "binding procedure input");
                stmt.set_input(position, value)
                    .await
                    .map_err(|source| SqlPoolError::ParameterBinding { position, source })?;
            }
            ProcedureParameter::Output {
                field_name,
                data_type,
            } => {
                trace!(position, field = %field_name, ?data_type, "registering procedure output");
                stmt.register_output(position, *data_type)
                    .await
                    .map_err(|source| SqlPoolError::ParameterBinding { position, source })?;
                outputs.push(OutputSlot {
                    position,
                    field_name,
                });
            }
        }
    }
    Ok(outputs)
}
