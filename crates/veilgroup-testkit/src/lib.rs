//! # Veilgroup Testkit
//!
//! Testing utilities for Veilgroup.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Codec vectors**: fixed secrets and plaintexts, checked structurally
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: deterministic registries, parties and mirrors
//!
//! ## Codec Vectors
//!
//! ```rust
//! use veilgroup_testkit::vectors::verify_all_vectors;
//!
//! for report in verify_all_vectors() {
//!     assert!(report.passed, "{}: {:?}", report.name, report.detail);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use veilgroup_core::{open, seal};
//! use veilgroup_testkit::generators::{group_secret, plaintext};
//!
//! proptest! {
//!     #[test]
//!     fn envelope_roundtrip(text in plaintext(), secret in group_secret()) {
//!         let sealed = seal(&text, secret).unwrap();
//!         prop_assert_eq!(open(&sealed, secret).unwrap(), text);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use veilgroup_testkit::fixtures::TestFixture;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let fixture = TestFixture::new()?;
//!     let parties = fixture.parties(3);
//!     let group = fixture.group_with("crew", &parties[0], &parties[1..]).await?;
//!     parties[1].send_text(group, "hi").await?;
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{TestClient, TestFixture, TestRegistry, FIXTURE_ENTROPY, GENESIS_MILLIS};
pub use generators::{GroupStep, ScriptParams};
pub use vectors::{all_vectors, check_vector, verify_all_vectors, CodecVector, VectorReport};
