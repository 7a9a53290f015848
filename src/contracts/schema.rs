use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contracts::{SlipKind, SlipNumber};

/// Lifecycle of a slip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlipStatus {
    #[default]
    Pending,
    InProgress,
    Delivered,
    Invoiced,
    Cancelled,
}

/// A client or a supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
}

/// Person to reach at a client, grouped by service (dispatch, reception...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub party_id: String,
    #[serde(flatten)]
    pub details: ContactDetails,
}

/// Editable part of a contact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactDetails {
    pub service: String,
    pub last_name: String,
    pub first_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// The single accounting contact of a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountingContact {
    pub party_id: String,
    pub last_name: String,
    pub first_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Activity totals over a loading-date range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub transport_count: usize,
    pub freight_count: usize,
    /// Sum of freight margins; slips without a margin count as zero.
    pub freight_margin: f64,
    /// Sum of freight selling prices.
    pub freight_revenue: f64,
}

/// Slip fields supplied by the caller. Everything except the number and the
/// bookkeeping columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlipFields {
    pub client_id: Option<String>,
    /// Freight only.
    pub supplier_id: Option<String>,
    /// Transport only.
    pub vehicle_id: Option<String>,

    pub loading_date: Option<NaiveDate>,
    pub loading_time: Option<NaiveTime>,
    pub loading_time_start: Option<NaiveTime>,
    pub loading_time_end: Option<NaiveTime>,
    pub loading_address: Option<String>,
    pub loading_contact: Option<String>,
    pub loading_instructions: Option<String>,

    pub delivery_date: Option<NaiveDate>,
    pub delivery_time: Option<NaiveTime>,
    pub delivery_time_start: Option<NaiveTime>,
    pub delivery_time_end: Option<NaiveTime>,
    pub delivery_address: Option<String>,
    pub delivery_contact: Option<String>,
    pub unloading_instructions: Option<String>,

    pub goods_description: Option<String>,
    pub volume: Option<f64>,
    pub weight: Option<f64>,
    pub metre: Option<f64>,
    pub vehicle_type: Option<String>,
    pub custom_vehicle_type: Option<String>,
    pub exchange_type: Option<String>,
    pub instructions: Option<String>,
    pub price: Option<f64>,
    pub payment_method: Option<String>,
    pub observations: Option<String>,
    pub photo_required: bool,
    pub documents: Vec<String>,
    pub commercial_id: Option<String>,
    pub order_number: Option<String>,
    pub purchase_price: Option<f64>,
    pub selling_price: Option<f64>,
    pub margin: Option<f64>,
    pub margin_rate: Option<f64>,
    pub tailgate: bool,
    pub kilometers: Option<f64>,
}

impl SlipFields {
    /// Recomputes margin and margin rate from the purchase and selling prices.
    /// Leaves both untouched when no selling price is known.
    pub fn recompute_margin(&mut self) {
        let Some(selling) = self.selling_price else {
            return;
        };
        let purchase = self.purchase_price.unwrap_or(0.0);
        let margin = selling - purchase;
        self.margin = Some(margin);
        self.margin_rate = Some(if selling > 0.0 {
            margin / selling * 100.0
        } else {
            0.0
        });
    }
}

/// A stored transport or freight slip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slip {
    pub id: Uuid,
    pub kind: SlipKind,
    pub number: SlipNumber,
    pub status: SlipStatus,
    #[serde(flatten)]
    pub fields: SlipFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update. There is deliberately no `number` here: a slip keeps the
/// number it was created with.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SlipUpdate {
    pub status: Option<SlipStatus>,
    pub client_id: Option<String>,
    pub supplier_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub loading_date: Option<NaiveDate>,
    pub loading_time: Option<NaiveTime>,
    pub loading_time_start: Option<NaiveTime>,
    pub loading_time_end: Option<NaiveTime>,
    pub loading_address: Option<String>,
    pub loading_contact: Option<String>,
    pub loading_instructions: Option<String>,
    pub delivery_date: Option<NaiveDate>,
    pub delivery_time: Option<NaiveTime>,
    pub delivery_time_start: Option<NaiveTime>,
    pub delivery_time_end: Option<NaiveTime>,
    pub delivery_address: Option<String>,
    pub delivery_contact: Option<String>,
    pub unloading_instructions: Option<String>,
    pub goods_description: Option<String>,
    pub volume: Option<f64>,
    pub weight: Option<f64>,
    pub metre: Option<f64>,
    pub vehicle_type: Option<String>,
    pub custom_vehicle_type: Option<String>,
    pub exchange_type: Option<String>,
    pub instructions: Option<String>,
    pub price: Option<f64>,
    pub payment_method: Option<String>,
    pub observations: Option<String>,
    pub photo_required: Option<bool>,
    pub documents: Option<Vec<String>>,
    pub commercial_id: Option<String>,
    pub order_number: Option<String>,
    pub purchase_price: Option<f64>,
    pub selling_price: Option<f64>,
    pub tailgate: Option<bool>,
    pub kilometers: Option<f64>,
}

macro_rules! merge_some {
    ($target:expr, $update:expr; $($field:ident),+ $(,)?) => {
        $(
            if let Some(v) = $update.$field {
                $target.$field = Some(v);
            }
        )+
    };
}

impl SlipUpdate {
    /// Applies every provided field onto `slip`. Margin is recomputed
    /// afterwards for freight slips.
    pub fn apply(self, slip: &mut Slip) {
        if let Some(status) = self.status {
            slip.status = status;
        }
        let f = &mut slip.fields;
        merge_some!(f, self;
            client_id, supplier_id, vehicle_id,
            loading_date, loading_time, loading_time_start, loading_time_end,
            loading_address, loading_contact, loading_instructions,
            delivery_date, delivery_time, delivery_time_start, delivery_time_end,
            delivery_address, delivery_contact, unloading_instructions,
            goods_description, volume, weight, metre, vehicle_type,
            custom_vehicle_type, exchange_type, instructions, price,
            payment_method, observations, commercial_id, order_number,
            purchase_price, selling_price, kilometers,
        );
        if let Some(v) = self.photo_required {
            f.photo_required = v;
        }
        if let Some(v) = self.documents {
            f.documents = v;
        }
        if let Some(v) = self.tailgate {
            f.tailgate = v;
        }
        if slip.kind == SlipKind::Freight {
            f.recompute_margin();
        }
    }
}
