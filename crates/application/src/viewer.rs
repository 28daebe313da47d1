//! Entity detail pages.

use futures::future::join_all;
use libcat_api::{ApiError, LibraryApi, Record};
use libcat_core::{
    EntityId, EntityKind, Loan, QueryParams, capitalize, format_property_key, viewer_link,
};
use libcat_engine::{Document, render_markdown};
use serde_json::Value;
use tracing::{debug, warn};

pub const INVALID_PARAMETERS: &str = "Invalid parameters.";
pub const ENTITY_NOT_FOUND: &str = "Entity not found.";
pub const NO_DESCRIPTION: &str = "No description available.";
pub const AVAILABLE_FOR_BORROWING: &str = "This book is currently available for borrowing.";

/// The entity a viewer page shows, parsed from `type` and `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerTarget {
    pub kind: EntityKind,
    /// `type` as given, used for the page heading.
    pub type_param: String,
    pub id: String,
}

impl ViewerTarget {
    pub fn new(kind: EntityKind, id: &EntityId) -> Self {
        Self {
            kind,
            type_param: kind.as_str().to_string(),
            id: id.as_str().to_string(),
        }
    }

    /// Fails with the message the page should show instead.
    pub fn from_params(params: &QueryParams) -> Result<Self, String> {
        let (Some(type_param), Some(id)) = (params.require("type"), params.require("id")) else {
            return Err(INVALID_PARAMETERS.to_string());
        };
        let kind = type_param
            .parse::<EntityKind>()
            .map_err(|_| format!("Unknown entity type: {type_param}."))?;
        Ok(Self {
            kind,
            type_param: type_param.to_string(),
            id: id.to_string(),
        })
    }

    pub fn link(&self) -> String {
        viewer_link(self.kind, &EntityId::new(self.id.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerPage {
    /// A single line in place of the page: bad parameters, not found, load errors.
    Message(String),
    Entity(EntityPage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityPage {
    pub heading: String,
    pub properties: Vec<Property>,
    /// Only set for books.
    pub loan: Option<LoanDetails>,
    /// What to ask the description service about; `None` when the entity has no name.
    pub subject: Option<DescriptionSubject>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    Text {
        label: String,
        value: String,
    },
    Link {
        label: String,
        name: String,
        target: ViewerTarget,
    },
}

impl Property {
    pub fn label(&self) -> &str {
        match self {
            Property::Text { label, .. } | Property::Link { label, .. } => label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoanDetails {
    OnLoan(Loan),
    Available,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionSubject {
    pub kind: EntityKind,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptionState {
    Loading,
    Ready(Document),
    Failed(String),
}

pub async fn open_viewer(api: &dyn LibraryApi, params: &QueryParams) -> ViewerPage {
    match ViewerTarget::from_params(params) {
        Ok(target) => load_entity(api, &target).await,
        Err(message) => ViewerPage::Message(message),
    }
}

pub async fn load_entity(api: &dyn LibraryApi, target: &ViewerTarget) -> ViewerPage {
    let records = match api.fetch_records(target.kind, &target.id).await {
        Ok(records) => records,
        Err(err) => {
            warn!(kind = %target.kind, id = %target.id, error = %err, "entity fetch failed");
            let reason = match err {
                ApiError::Status { .. } => format!(
                    "Failed to fetch {} with ID {}",
                    target.type_param.to_lowercase(),
                    target.id
                ),
                other => other.to_string(),
            };
            return ViewerPage::Message(format!("Error loading entity details: {reason}"));
        }
    };
    let Some(entity) = records.into_iter().next() else {
        return ViewerPage::Message(ENTITY_NOT_FOUND.to_string());
    };

    let properties = collect_properties(api, &entity).await;
    let loan = (target.kind == EntityKind::Books).then(|| loan_details(&entity));
    let subject = entity
        .get(target.kind.name_field())
        .filter(|value| !value.is_null())
        .map(display_value)
        .filter(|name| !name.is_empty())
        .map(|name| DescriptionSubject {
            kind: target.kind,
            name,
        });

    ViewerPage::Entity(EntityPage {
        heading: format!("{} Details", capitalize(&target.type_param)),
        properties,
        loan,
        subject,
    })
}

enum Slot {
    Ready(Property),
    Reference { label: String, target: ViewerTarget },
}

/// Properties in record order. References to authors, publishers and genres
/// are resolved concurrently; one that cannot be resolved is left out.
async fn collect_properties(api: &dyn LibraryApi, entity: &Record) -> Vec<Property> {
    let mut slots = Vec::new();
    for (key, value) in entity {
        if key == "id" || key == "description" {
            continue;
        }
        let label = format_property_key(key);
        match EntityKind::from_reference_field(key) {
            Some(kind) if is_truthy(value) => slots.push(Slot::Reference {
                label,
                target: ViewerTarget::new(kind, &EntityId::new(display_value(value))),
            }),
            _ if !value.is_null() => slots.push(Slot::Ready(Property::Text {
                label,
                value: display_value(value),
            })),
            _ => {}
        }
    }

    let resolves = slots.iter().map(|slot| async move {
        match slot {
            Slot::Reference { target, .. } => resolve_name(api, target).await,
            Slot::Ready(_) => None,
        }
    });
    let names = join_all(resolves).await;

    slots
        .into_iter()
        .zip(names)
        .filter_map(|(slot, name)| match slot {
            Slot::Ready(property) => Some(property),
            Slot::Reference { label, target } => name.map(|name| Property::Link {
                label,
                name,
                target,
            }),
        })
        .collect()
}

async fn resolve_name(api: &dyn LibraryApi, target: &ViewerTarget) -> Option<String> {
    match api.fetch_records(target.kind, &target.id).await {
        Ok(records) => {
            let record = records.into_iter().next()?;
            Some(record.get("name").map(display_value).unwrap_or_default())
        }
        Err(err) => {
            debug!(kind = %target.kind, id = %target.id, error = %err, "reference not resolved");
            None
        }
    }
}

fn loan_details(entity: &Record) -> LoanDetails {
    let field = |key: &str| match entity.get(key) {
        Some(Value::Null) | None => String::new(),
        Some(value) => display_value(value),
    };
    let borrower = field("borrower");
    if borrower.is_empty() {
        return LoanDetails::Available;
    }
    LoanDetails::OnLoan(Loan {
        borrower,
        borrow_date: field("borrowdate"),
        return_date: field("returndate"),
    })
}

/// Asks the description service about `subject` and renders the Markdown it returns.
pub async fn fetch_description(
    api: &dyn LibraryApi,
    subject: &DescriptionSubject,
) -> DescriptionState {
    match api.describe(subject.kind, &subject.name).await {
        Ok(markdown) => {
            let document = markdown
                .map(|text| render_markdown(&text))
                .filter(|document| !document.is_empty())
                .unwrap_or_else(|| render_markdown(NO_DESCRIPTION));
            DescriptionState::Ready(document)
        }
        Err(err) => {
            warn!(
                kind = %subject.kind,
                name = %subject.name,
                error = %err,
                "description fetch failed"
            );
            DescriptionState::Failed(description_error_message(&err))
        }
    }
}

pub fn description_error_message(err: &ApiError) -> String {
    match err.status() {
        Some(400) => "Invalid request. Entity name is missing.".to_string(),
        Some(500) => "Server error while fetching description.".to_string(),
        Some(_) => "Unexpected error occurred.".to_string(),
        None => err.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Renders a JSON value the way it reads in a property list.
fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Array(items) => items.iter().map(display_value).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}
