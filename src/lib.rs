//! # Identeco (Identity & Session Lifecycle)
//!
//! `identeco` is an identity and authentication service. It handles user
//! registration, credential verification, JWT issuance and rotation,
//! role-based authorization, and per-user rate limiting.
//!
//! ## Session Model
//!
//! Every successful signup, login, or refresh issues a paired access/refresh
//! token set:
//!
//! - **Access tokens** are short-lived and tracked as "live" in an ephemeral
//!   registry; logout revokes them immediately instead of waiting for the TTL.
//! - **Refresh tokens** are single-use. Each refresh consumes the presented
//!   token and issues a replacement atomically, so a chain has at most one
//!   live refresh token and a replayed token always fails.
//!
//! ## Authorization
//!
//! Token claims carry the role set the user had at mint time; authorization
//! decisions trust the token until it is invalidated. A `superuser` role
//! passes every check.

pub mod api;
pub mod auth;
pub mod cli;
pub mod socials;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }
}
