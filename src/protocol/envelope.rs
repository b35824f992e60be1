//! The JSON envelope exchanged with edit and consolidation workers.
//!
//! A request looks like this (the `Data` snapshot is abbreviated):
//!
//! ```json
//! {
//!   "Type": "Request",
//!   "ID": "3",
//!   "Col": "Amount",
//!   "New Value": -42.10,
//!   "Data": { "Date": { "0": "2024-03-01" }, "Amount": { "0": -87.43 } }
//! }
//! ```
//!
//! A consolidation request carries `Category List` and `New Category` instead of `ID`, `Col` and
//! `New Value`. A response carries only `Type` and `Data`.

use crate::error::ProtocolError;
use crate::model::{Cell, RowId, Table, TransactionColumn};
use crate::Result;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

const REQUEST: &str = "Request";
const RESPONSE: &str = "Response";

/// The `Type` discriminator of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    Request,
    Response,
}

impl EnvelopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeKind::Request => REQUEST,
            EnvelopeKind::Response => RESPONSE,
        }
    }
}

impl Display for EnvelopeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The operation a worker is asked to perform on the `Data` snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Set one cell. Numeric columns carry a number unless conversion failed.
    Edit {
        id: RowId,
        column: TransactionColumn,
        value: Cell,
    },
    /// Rewrite every row whose category is in the comma-separated `categories` list.
    Consolidate {
        categories: String,
        new_category: String,
    },
}

/// A request: an operation plus the entire current table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub operation: Operation,
    pub data: Table,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Request(Request),
    /// The full replacement table.
    Response(Table),
}

impl Envelope {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Envelope::Request(_) => EnvelopeKind::Request,
            Envelope::Response(_) => EnvelopeKind::Response,
        }
    }

    pub fn data(&self) -> &Table {
        match self {
            Envelope::Request(request) => &request.data,
            Envelope::Response(data) => data,
        }
    }
}

/// Outgoing wire shape. Borrows everything so encoding never copies the table.
#[derive(Serialize)]
struct WireOut<'a> {
    #[serde(rename = "Type")]
    kind: &'static str,
    #[serde(rename = "ID", skip_serializing_if = "Option::is_none")]
    id: Option<RowId>,
    #[serde(rename = "Col", skip_serializing_if = "Option::is_none")]
    column: Option<TransactionColumn>,
    #[serde(rename = "New Value", skip_serializing_if = "Option::is_none")]
    new_value: Option<&'a Cell>,
    #[serde(rename = "Category List", skip_serializing_if = "Option::is_none")]
    category_list: Option<&'a str>,
    #[serde(rename = "New Category", skip_serializing_if = "Option::is_none")]
    new_category: Option<&'a str>,
    #[serde(rename = "Data")]
    data: &'a Table,
}

/// Incoming wire shape. Every payload field is optional here and checked afterwards.
#[derive(Deserialize)]
struct WireIn {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "ID", default)]
    id: Option<RowId>,
    #[serde(rename = "Col", default)]
    column: Option<TransactionColumn>,
    #[serde(rename = "New Value", default)]
    new_value: Option<Cell>,
    #[serde(rename = "Category List", default)]
    category_list: Option<String>,
    #[serde(rename = "New Category", default)]
    new_category: Option<String>,
    #[serde(rename = "Data")]
    data: Table,
}

/// Serializes an envelope to the bytes that are written into a mailbox.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>> {
    let mut wire = WireOut {
        kind: envelope.kind().as_str(),
        id: None,
        column: None,
        new_value: None,
        category_list: None,
        new_category: None,
        data: envelope.data(),
    };
    if let Envelope::Request(request) = envelope {
        match &request.operation {
            Operation::Edit { id, column, value } => {
                wire.id = Some(*id);
                wire.column = Some(*column);
                wire.new_value = Some(value);
            }
            Operation::Consolidate {
                categories,
                new_category,
            } => {
                wire.category_list = Some(categories);
                wire.new_category = Some(new_category);
            }
        }
    }
    serde_json::to_vec_pretty(&wire).context("Unable to serialize envelope")
}

/// Parses mailbox bytes. Empty, truncated or otherwise malformed content is a
/// `ProtocolError::Decode`, which callers that poll treat as "not ready yet".
pub fn decode(bytes: &[u8]) -> std::result::Result<Envelope, ProtocolError> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ProtocolError::Decode(String::from("the mailbox is empty")));
    }
    let wire: WireIn =
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))?;

    let WireIn {
        kind,
        id,
        column,
        new_value,
        category_list,
        new_category,
        data,
    } = wire;

    match kind.as_str() {
        RESPONSE => Ok(Envelope::Response(data)),
        REQUEST => {
            let operation = match (id, column, new_value, category_list, new_category) {
                (Some(id), Some(column), Some(value), _, _) => Operation::Edit { id, column, value },
                (_, _, _, Some(categories), Some(new_category)) => Operation::Consolidate {
                    categories,
                    new_category,
                },
                _ => {
                    return Err(ProtocolError::Decode(String::from(
                        "a request needs either 'ID', 'Col' and 'New Value' or \
                        'Category List' and 'New Category'",
                    )))
                }
            };
            Ok(Envelope::Request(Request { operation, data }))
        }
        other => Err(ProtocolError::Decode(format!(
            "unknown envelope type '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn table() -> Table {
        let mut table = Table::transactions();
        table
            .push_row(vec![
                "Checking".into(),
                "Debit".into(),
                "2024-03-01".into(),
                "Grocer".into(),
                Decimal::from_str("-87.43").unwrap().into(),
                "Food".into(),
            ])
            .unwrap();
        table
            .push_row(vec![
                "Visa".into(),
                "Credit".into(),
                "2024-03-05".into(),
                "Héllo café".into(),
                Decimal::from_str("-0.1").unwrap().into(),
                "Dining".into(),
            ])
            .unwrap();
        table
    }

    fn edit() -> Envelope {
        Envelope::Request(Request {
            operation: Operation::Edit {
                id: RowId::new(1),
                column: TransactionColumn::Amount,
                value: Decimal::from_str("-42.10").unwrap().into(),
            },
            data: table(),
        })
    }

    fn consolidate() -> Envelope {
        Envelope::Request(Request {
            operation: Operation::Consolidate {
                categories: String::from("Food, Dining"),
                new_category: String::from("Eating"),
            },
            data: table(),
        })
    }

    #[test]
    fn test_round_trip() {
        for envelope in [edit(), consolidate(), Envelope::Response(table())] {
            let bytes = encode(&envelope).unwrap();
            assert_eq!(decode(&bytes).unwrap(), envelope);
        }
    }

    #[test]
    fn test_edit_wire_fields() {
        let json: serde_json::Value = serde_json::from_slice(&encode(&edit()).unwrap()).unwrap();
        assert_eq!(json["Type"], "Request");
        assert_eq!(json["ID"], "1");
        assert_eq!(json["Col"], "Amount");
        assert_eq!(json["New Value"].to_string(), "-42.10");
        assert_eq!(json["Data"]["Amount"]["0"].to_string(), "-87.43");
        assert!(json.get("Category List").is_none());
    }

    #[test]
    fn test_consolidate_wire_fields() {
        let json: serde_json::Value =
            serde_json::from_slice(&encode(&consolidate()).unwrap()).unwrap();
        assert_eq!(json["Category List"], "Food, Dining");
        assert_eq!(json["New Category"], "Eating");
        assert!(json.get("ID").is_none());
    }

    #[test]
    fn test_text_new_value_stays_text() {
        let envelope = Envelope::Request(Request {
            operation: Operation::Edit {
                id: RowId::new(0),
                column: TransactionColumn::Amount,
                value: Cell::text("about ten"),
            },
            data: table(),
        });
        let json: serde_json::Value =
            serde_json::from_slice(&encode(&envelope).unwrap()).unwrap();
        assert_eq!(json["New Value"], "about ten");
    }

    #[test]
    fn test_decode_truncated_never_succeeds() {
        let bytes = encode(&Envelope::Response(table())).unwrap();
        for len in 0..bytes.len() {
            assert!(
                matches!(decode(&bytes[..len]), Err(ProtocolError::Decode(_))),
                "prefix of length {len} decoded"
            );
        }
    }

    #[test]
    fn test_decode_empty_and_garbage() {
        assert!(matches!(decode(b""), Err(ProtocolError::Decode(_))));
        assert!(matches!(decode(b"  \n"), Err(ProtocolError::Decode(_))));
        assert!(matches!(decode(b"-30.5\n"), Err(ProtocolError::Decode(_))));
        assert!(matches!(decode(&[0xff, 0xfe]), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_unknown_type() {
        let err = decode(br#"{"Type": "Ack", "Data": {}}"#).unwrap_err();
        assert!(err.to_string().contains("unknown envelope type 'Ack'"));
    }

    #[test]
    fn test_decode_request_without_operation() {
        let result = decode(br#"{"Type": "Request", "ID": "1", "Data": {}}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_integer_id() {
        let envelope = decode(
            br#"{"Type": "Request", "ID": 4, "Col": "Category", "New Value": "Rent", "Data": {}}"#,
        )
        .unwrap();
        let Envelope::Request(request) = envelope else {
            panic!("expected a request");
        };
        assert_eq!(
            request.operation,
            Operation::Edit {
                id: RowId::new(4),
                column: TransactionColumn::Category,
                value: Cell::text("Rent"),
            }
        );
    }
}
