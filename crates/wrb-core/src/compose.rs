//! Reminder sentence generation.
//!
//! Pure text algorithms only; no I/O and no shared state. The dispatch
//! engine calls [`reminder_sentence`] once per recipient when building the
//! outgoing bundle.

use chrono::NaiveDate;
use serde::Deserialize;

/// One pet belonging to a recipient.
#[derive(Clone, Debug, Deserialize)]
pub struct Pet {
    pub name: String,
    #[serde(default)]
    pub treatments: Vec<Treatment>,
}

/// A pending reminder category for a pet (vaccine, deworming, ...).
#[derive(Clone, Debug, Deserialize)]
pub struct Treatment {
    pub name: String,
    #[serde(default)]
    pub variants: Vec<Variant>,
}

/// A concrete product/dose inside a treatment, with its due date.
#[derive(Clone, Debug, Deserialize)]
pub struct Variant {
    pub name: String,
    pub due_date: NaiveDate,
}

/// Join names Spanish-style: a single item becomes `"{name}."`, longer lists
/// comma-join everything but the last item and attach it with `" y "`,
/// always closing with a period.
pub fn join_names<S: AsRef<str>>(items: &[S]) -> String {
    match items {
        [] => String::new(),
        [only] => format!("{}.", only.as_ref()),
        [init @ .., last] => {
            let head = init
                .iter()
                .map(|s| s.as_ref())
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} y {}.", head, last.as_ref())
        }
    }
}

/// Build the reminder sentence for a recipient's pets.
///
/// The same join rule is applied at all three nesting levels: pet names,
/// treatment names across the pets, and variant names across the treatments,
/// each flattened in display order.
///
/// Returns `None` when the nested records are incomplete (no pets, or no
/// treatment/variant entries to name).
pub fn reminder_sentence(pets: &[Pet]) -> Option<String> {
    let pet_names: Vec<&str> = pets.iter().map(|p| p.name.as_str()).collect();
    let treatment_names: Vec<&str> = pets
        .iter()
        .flat_map(|p| &p.treatments)
        .map(|t| t.name.as_str())
        .collect();
    let variant_names: Vec<&str> = pets
        .iter()
        .flat_map(|p| &p.treatments)
        .flat_map(|t| &t.variants)
        .map(|v| v.name.as_str())
        .collect();

    if pet_names.is_empty() || treatment_names.is_empty() || variant_names.is_empty() {
        return None;
    }

    // Known limitation: only the very first variant's due date is surfaced,
    // even when later entries carry different dates.
    let due = pets.first()?.treatments.first()?.variants.first()?.due_date;

    Some(format!(
        "su(s) mascota(s) '{}', tiene(n) pendiente la aplicación de {} ({}) para el día {}",
        join_names(&pet_names),
        join_names(&treatment_names),
        join_names(&variant_names),
        due.format("%d/%m/%Y"),
    ))
}
