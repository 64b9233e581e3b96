use chrono::Utc;
use dashmap::DashMap;

use crate::util::random_string;

/// Mints an opaque attendee identity token.
///
/// Tokens are generated on the participant's side of the boundary and are
/// only ever used to scope one-vote-per-token. This is deliberately weak
/// identity: clearing local state or switching devices yields a fresh token,
/// and no attempt is made to prevent that.
pub fn mint_session_token() -> String {
    format!("{}-{}", Utc::now().timestamp_millis(), random_string(16))
}

/// Holds one session token per room for a single device.
///
/// The first encounter with a room mints a token; every later visit to the
/// same room resolves to the same one, so repeated or retried votes collapse
/// into a single count.
#[derive(Default)]
pub struct IdentityVault {
    tokens: DashMap<String, String>,
}

impl IdentityVault {
    /// Returns the device's token for the given room, minting it if needed
    pub fn resolve(&self, room_code: &str) -> String {
        self.tokens
            .entry(room_code.to_string())
            .or_insert_with(mint_session_token)
            .value()
            .clone()
    }

    /// Discards the token for a room. Tokens are scoped to one room
    /// lifetime, so this is called when the room closes.
    pub fn forget(&self, room_code: &str) {
        self.tokens.remove(room_code);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tokens_are_stable_per_room() {
        let vault = IdentityVault::default();

        let first = vault.resolve("4821");
        let second = vault.resolve("4821");

        assert_eq!(first, second);
    }

    #[test]
    fn tokens_differ_across_rooms() {
        let vault = IdentityVault::default();

        assert_ne!(vault.resolve("4821"), vault.resolve("1234"));
    }

    #[test]
    fn forgetting_mints_a_fresh_token() {
        let vault = IdentityVault::default();

        let first = vault.resolve("4821");
        vault.forget("4821");

        assert_ne!(first, vault.resolve("4821"));
    }
}
