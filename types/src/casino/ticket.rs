use serde::{Deserialize, Serialize};

use super::Currency;

pub type PurchaseId = u64;

/// How a ticket is revealed on screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TicketKind {
    Scratch,
    PullTab,
}

/// A ticket product offered by the catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketType {
    pub id: u64,
    pub name: String,
    pub kind: TicketKind,
    pub price: f64,
    pub currency: Currency,
    /// Number of tabs for pull-tab tickets; ignored for scratch tickets.
    #[serde(default)]
    pub tabs: u8,
}

/// Lifecycle of a purchased ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Purchased,
    Revealing,
    Revealed,
    Claimed,
    Saved,
}

impl TicketStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Claimed | TicketStatus::Saved)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketPurchase {
    pub purchase_id: PurchaseId,
    pub ticket_type_id: u64,
    pub price: f64,
    pub currency: Currency,
    pub status: TicketStatus,
}
