//! Turns raw queue payloads into typed funds-movement requests.
//!
//! Wire contract: a JSON object with a string `messageType` of `"Credit"` or
//! `"Debit"`, a string `bankAccountId` and a positive numeric `amount`.

use super::account::Amount;
use super::request::{Direction, FundsMovementRequest};
use crate::error::ClassificationError;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;

pub fn classify(payload: &[u8]) -> Result<FundsMovementRequest, ClassificationError> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| ClassificationError::MalformedPayload(format!("invalid JSON: {e}")))?;
    let object = value.as_object().ok_or_else(|| {
        ClassificationError::MalformedPayload("payload is not a JSON object".to_string())
    })?;

    let direction = match required_str(object, "messageType")? {
        "Credit" => Direction::Credit,
        "Debit" => Direction::Debit,
        other => return Err(ClassificationError::UnknownMessageType(other.to_string())),
    };

    let account_id = required_str(object, "bankAccountId")?;
    if account_id.is_empty() {
        return Err(ClassificationError::MalformedPayload(
            "bankAccountId is empty".to_string(),
        ));
    }

    let amount = match object.get("amount") {
        Some(Value::Number(number)) => parse_decimal(&number.to_string())?,
        Some(other) => {
            return Err(ClassificationError::MalformedPayload(format!(
                "amount is not a number: {other}"
            )));
        }
        None => {
            return Err(ClassificationError::MalformedPayload(
                "missing field `amount`".to_string(),
            ));
        }
    };
    let amount =
        Amount::new(amount).map_err(|e| ClassificationError::MalformedPayload(e.to_string()))?;

    Ok(FundsMovementRequest::new(account_id, amount, direction))
}

fn required_str<'a>(
    object: &'a Map<String, Value>,
    field: &str,
) -> Result<&'a str, ClassificationError> {
    match object.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(ClassificationError::MalformedPayload(format!(
            "`{field}` is not a string: {other}"
        ))),
        None => Err(ClassificationError::MalformedPayload(format!(
            "missing field `{field}`"
        ))),
    }
}

// serde_json renders large or tiny floats in exponent form, which
// `Decimal::from_str` refuses.
fn parse_decimal(text: &str) -> Result<Decimal, ClassificationError> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|e| ClassificationError::MalformedPayload(format!("amount {text}: {e}")))
}
