use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Read-only projection of a document in the `order` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: String,

    #[serde(default)]
    pub payment_id: String,

    pub full_name: String,
    pub email: String,

    #[serde(default)]
    pub mobile_number: String,

    pub event_name: String,

    /// Free-form event time label; when absent the event date is rendered
    /// from `date_time`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<String>,

    pub event_place: String,
    pub ticket_number: String,
    pub ticket_type: String,
    pub seat_number: i32,
    pub amount: i64,

    #[serde(default)]
    pub bank: String,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub order_time: DateTime<Utc>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub date_time: DateTime<Utc>,
}
