//! Persisted entities and their document mappings.

pub mod user;
pub mod user_ip;

pub use user::UserProfile;
pub use user_ip::UserIpRecord;

/// Collection of user profiles, keyed by uid.
pub const USERS_COLLECTION: &str = "users";

/// Collection of last-seen IP records, keyed by uid.
pub const USER_IPS_COLLECTION: &str = "user_ips";
