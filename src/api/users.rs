//! Roster endpoint

use super::client::HistoryClient;
use crate::error::HistoryFetchError;
use crate::models::User;

/// `GET /users?currentUser=<me>`: everyone except `me`.
///
/// The service already excludes the caller; the filter here guards against
/// servers that don't.
pub async fn list_users_data(client: &HistoryClient, me: &str) -> Result<Vec<User>, HistoryFetchError> {
    let users: Vec<User> = client.get_json("users", &[("currentUser", me)]).await?;
    Ok(users.into_iter().filter(|u| u.username != me).collect())
}
