use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Stable identifier stamped on every order at intake.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    #[serde(alias = "vacancy")]
    VacancyRequest,
    #[serde(alias = "resume")]
    ResumeRequest,
}

impl OrderKind {
    pub const fn ordered() -> [Self; 2] {
        [Self::VacancyRequest, Self::ResumeRequest]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::VacancyRequest => "Vacancy request",
            Self::ResumeRequest => "Resume request",
        }
    }

    /// Value written to the `kind` field of stored documents.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::VacancyRequest => "vacancy_request",
            Self::ResumeRequest => "resume_request",
        }
    }

    /// Document field carrying the order subject.
    pub const fn subject_field(self) -> &'static str {
        match self {
            Self::VacancyRequest => "occupation",
            Self::ResumeRequest => "criteria",
        }
    }

    /// Directory under the reports root holding this kind's artifacts.
    pub const fn report_dir(self) -> &'static str {
        match self {
            Self::VacancyRequest => "vacancies",
            Self::ResumeRequest => "resumes",
        }
    }

    pub fn from_tag(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "vacancy_request" | "vacancy" | "vacancies" => Some(Self::VacancyRequest),
            "resume_request" | "resume" | "resumes" => Some(Self::ResumeRequest),
            _ => None,
        }
    }

    pub fn from_report_dir(raw: &str) -> Option<Self> {
        Self::ordered()
            .into_iter()
            .find(|kind| kind.report_dir() == raw)
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Typed view over a stored order document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: Option<OrderId>,
    pub kind: OrderKind,
    pub customer: Option<String>,
    pub subject: String,
}

impl Order {
    pub fn new(kind: OrderKind, customer: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            id: Some(OrderId::generate()),
            kind,
            customer: Some(customer.into()),
            subject: subject.into(),
        }
    }

    pub fn to_document(&self) -> OrderDocument {
        let mut fields = Map::new();
        if let Some(id) = &self.id {
            fields.insert("id".to_string(), Value::String(id.0.clone()));
        }
        fields.insert(
            "kind".to_string(),
            Value::String(self.kind.tag().to_string()),
        );
        if let Some(customer) = &self.customer {
            fields.insert("customer".to_string(), Value::String(customer.clone()));
        }
        fields.insert(
            self.kind.subject_field().to_string(),
            Value::String(self.subject.clone()),
        );
        OrderDocument(fields)
    }
}

/// Reasons a stored document cannot be dispatched to a handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("document carries neither a kind tag nor an occupation/criteria field")]
    Unclassified,
    #[error("unknown order kind '{0}'")]
    UnknownKind(String),
    #[error("{kind} order is missing its '{field}' text")]
    MissingSubject { kind: OrderKind, field: &'static str },
}

/// Raw queue document. Equality is structural over every field, which is what
/// queue removal matches on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderDocument(pub Map<String, Value>);

impl OrderDocument {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<OrderId> {
        self.get_str("id").map(|id| OrderId(id.to_string()))
    }

    /// Canonical JSON rendering; keys are sorted so equal documents render
    /// identically.
    pub fn canonical(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }

    /// Resolve the order kind and payload.
    ///
    /// An explicit `kind` tag wins. Untagged documents fall back to the field
    /// that is present: `occupation` marks a vacancy request, `criteria` a
    /// resume request.
    pub fn classify(&self) -> Result<Order, OrderError> {
        let kind = match self.0.get("kind") {
            Some(Value::String(tag)) => {
                OrderKind::from_tag(tag).ok_or_else(|| OrderError::UnknownKind(tag.clone()))?
            }
            Some(other) => return Err(OrderError::UnknownKind(other.to_string())),
            None => self.infer_kind()?,
        };

        let field = kind.subject_field();
        let subject = self
            .get_str(field)
            .filter(|subject| !subject.trim().is_empty())
            .ok_or(OrderError::MissingSubject { kind, field })?;

        Ok(Order {
            id: self.id(),
            kind,
            customer: self.get_str("customer").map(str::to_string),
            subject: subject.to_string(),
        })
    }

    fn infer_kind(&self) -> Result<OrderKind, OrderError> {
        OrderKind::ordered()
            .into_iter()
            .find(|kind| self.0.contains_key(kind.subject_field()))
            .ok_or(OrderError::Unclassified)
    }
}

impl fmt::Display for OrderDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl From<Map<String, Value>> for OrderDocument {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}
