use std::fmt::{Display, Formatter, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Retriable failure; the message goes back through the retry path.
    Transient(String),
    /// The payload itself can never be delivered.
    Malformed(String),
}

impl Display for DeliveryOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            DeliveryOutcome::Delivered => write!(f, "delivered"),
            DeliveryOutcome::Transient(reason) => write!(f, "transient failure: {}", reason),
            DeliveryOutcome::Malformed(reason) => write!(f, "malformed payload: {}", reason),
        }
    }
}
