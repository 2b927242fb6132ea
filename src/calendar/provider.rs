use async_trait::async_trait;

use super::error::CalendarError;
use super::types::{BatchRequest, ItemResult};

/// Source of bearer tokens for Microsoft Graph.
///
/// Implementations own whatever state is needed to keep a token fresh
/// (refresh tokens, expiry), which is why acquiring one takes `&mut self`.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return an access token that is valid for at least the next request.
    async fn access_token(&mut self) -> Result<String, CalendarError>;

    /// Human-readable account name (e.g., email address).
    fn account_name(&self) -> &str;
}

/// Sends one group of calendar requests as a single round trip.
#[async_trait]
pub trait BatchSender: Send + Sync {
    /// Submit `requests` and return one result per request, in submission order.
    ///
    /// An `Err` means the whole batch failed in transport or authorization;
    /// individual request failures are reported through `ItemResult::status`.
    async fn send_batch(&self, requests: &[BatchRequest]) -> Result<Vec<ItemResult>, CalendarError>;
}
