use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};

use crate::contracts::{Party, Slip, SlipKind};

const DATE_FORMAT: &str = "%d/%m/%Y";
const TIME_FORMAT: &str = "%H:%M";

/// Everything a bordereau template can reference.
pub struct BordereauContext<'a> {
    pub slip: &'a Slip,
    pub client: Option<&'a Party>,
    pub supplier: Option<&'a Party>,
    pub today: NaiveDate,
}

/// `HH:MM à HH:MM` for a window, `HH:MM` for a single time, empty otherwise.
fn time_slot(
    single: Option<NaiveTime>,
    start: Option<NaiveTime>,
    end: Option<NaiveTime>,
) -> Option<String> {
    match (start, end, single) {
        (Some(s), Some(e), _) => Some(format!(
            "{} à {}",
            s.format(TIME_FORMAT),
            e.format(TIME_FORMAT)
        )),
        (_, _, Some(t)) => Some(t.format(TIME_FORMAT).to_string()),
        _ => None,
    }
}

fn date_and_time(date: Option<NaiveDate>, time: Option<String>) -> String {
    let date = date.map(|d| d.format(DATE_FORMAT).to_string());
    match (date, time) {
        (Some(d), Some(t)) => format!("{} {}", d, t),
        (Some(d), None) => d,
        (None, Some(t)) => t,
        (None, None) => String::new(),
    }
}

fn number_or_dash(v: Option<f64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_else(|| "-".into())
}

fn text(v: &Option<String>) -> String {
    v.clone().unwrap_or_default()
}

/// Builds the `{{key}}` substitution map for a bordereau.
pub fn bordereau_fields(ctx: &BordereauContext<'_>) -> BTreeMap<String, String> {
    let slip = ctx.slip;
    let f = &slip.fields;
    let freight = slip.kind == SlipKind::Freight;
    let supplier = if freight { ctx.supplier } else { None };

    let loading = time_slot(f.loading_time, f.loading_time_start, f.loading_time_end);
    let delivery = time_slot(f.delivery_time, f.delivery_time_start, f.delivery_time_end)
        .unwrap_or_else(|| "Livraison foulée".into());

    let vehicle_type = match f.vehicle_type.as_deref() {
        Some("Autre") => text(&f.custom_vehicle_type),
        other => other.unwrap_or_default().to_string(),
    };
    let price = if freight { f.purchase_price } else { f.price };
    let interlocutor = if freight {
        f.commercial_id
            .clone()
            .unwrap_or_else(|| "NON RENSEIGNÉ".into())
    } else {
        String::new()
    };

    let mut m = BTreeMap::new();
    let mut put = |k: &str, v: String| {
        m.insert(k.to_string(), v);
    };

    put("donneur_ordre", ctx.client.map(|c| c.name.clone()).unwrap_or_default());
    put("transporteur", supplier.map(|s| s.name.clone()).unwrap_or_default());
    put(
        "tel_transporteur",
        supplier.and_then(|s| s.phone.clone()).unwrap_or_default(),
    );
    put(
        "contact_fournisseur",
        supplier.and_then(|s| s.contact_name.clone()).unwrap_or_default(),
    );
    put("date", ctx.today.format(DATE_FORMAT).to_string());
    put("date_heure_chargement", date_and_time(f.loading_date, loading));
    put(
        "date_heure_livraison",
        date_and_time(f.delivery_date, Some(delivery)),
    );
    put("adresse_chargement", text(&f.loading_address));
    put("adresse_livraison", text(&f.delivery_address));
    put("contact_chargement", text(&f.loading_contact));
    put("contact_livraison", text(&f.delivery_contact));
    put("marchandise", text(&f.goods_description));
    put("volume", number_or_dash(f.volume));
    put("poids", number_or_dash(f.weight));
    put("metre", number_or_dash(f.metre));
    put(
        "echange",
        if f.exchange_type.as_deref() == Some("Oui") { "oui" } else { "non" }.into(),
    );
    put("price", number_or_dash(price));
    put("mode_reglement", text(&f.payment_method));
    put("nom_interlocuteur", interlocutor);
    put("number", slip.number.to_string());
    put("instructions", text(&f.instructions));
    put("loading_instructions", text(&f.loading_instructions));
    put("unloading_instructions", text(&f.unloading_instructions));
    put("vehicle_type", vehicle_type);
    put("tailgate", if f.tailgate { "HAYON" } else { "" }.into());
    put("kilometers", number_or_dash(f.kilometers));
    m
}
