//! Envelope codec vectors.
//!
//! Each vector pins a secret, a plaintext and the sealed envelope other
//! clients must produce. [`check_vector`] compares against the pinned value
//! and also verifies the envelope structurally: two envelopes sealed under
//! the same secret differ by exactly the XOR of their unmasked blocks,
//! because the key stream cancels out.

use serde::Serialize;

use veilgroup_core::{open, seal, GroupSecret, ENVELOPE_WIDTH, MAX_PAYLOAD_LEN};

/// A codec test vector.
#[derive(Debug, Clone)]
pub struct CodecVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub secret: u64,
    pub plaintext: &'static str,
    /// Expected envelope as a 64-character hex integer.
    pub expected_sealed: &'static str,
}

/// Outcome of checking one vector.
#[derive(Debug, Clone, Serialize)]
pub struct VectorReport {
    pub name: String,
    /// Unmasked block, hex-encoded in byte order.
    pub block: String,
    /// Sealed envelope as a 64-character hex integer.
    pub sealed: String,
    pub passed: bool,
    pub detail: Option<String>,
}

/// Get all codec vectors.
pub fn all_vectors() -> Vec<CodecVector> {
    vec![
        CodecVector {
            name: "hello",
            secret: 0x0123_4567_89ab_cdef,
            plaintext: "Hello",
            expected_sealed: "b7ce817b1374e5490bf5996db33cfd0f189172b4498db0706533b9d1798a665e",
        },
        CodecVector {
            name: "empty",
            secret: 0x0123_4567_89ab_cdef,
            plaintext: "",
            expected_sealed: "b286e4177f1be5490bf5996db33cfd0f189172b4498db0706533b9d1798a665e",
        },
        CodecVector {
            name: "full width",
            secret: 42,
            plaintext: "abcdefghijklmnopqrstuvwxyz01234",
            expected_sealed: "016a800b095dd3ac01acbb24207618ba1c78cfd4b523a9b46e93c55f87530403",
        },
        CodecVector {
            name: "multibyte",
            secret: u64::MAX,
            plaintext: "héllo wörld ✓",
            expected_sealed: "f4491c37dfdcbd712e40893b831180321f5aeac3606422ce6e6ccd902a2424a5",
        },
        CodecVector {
            name: "zero secret",
            secret: 0,
            plaintext: "zero",
            expected_sealed: "d20e3522f35219c0fa084d757128920cb38bf12575eed9f6d82539005a9445d0",
        },
    ]
}

/// The unmasked block for `plaintext`: length byte, text, zero padding.
pub fn plain_block(plaintext: &str) -> Option<[u8; ENVELOPE_WIDTH]> {
    let bytes = plaintext.as_bytes();
    if bytes.len() > MAX_PAYLOAD_LEN {
        return None;
    }
    let mut block = [0u8; ENVELOPE_WIDTH];
    block[0] = bytes.len() as u8;
    block[1..1 + bytes.len()].copy_from_slice(bytes);
    Some(block)
}

/// Check one vector against the empty-text envelope under the same secret.
pub fn check_vector(vector: &CodecVector) -> VectorReport {
    let secret = GroupSecret(vector.secret);
    let block_hex = plain_block(vector.plaintext)
        .map(hex::encode)
        .unwrap_or_default();
    let fail = |sealed: String, detail: String| VectorReport {
        name: vector.name.to_string(),
        block: block_hex.clone(),
        sealed,
        passed: false,
        detail: Some(detail),
    };

    let (sealed, baseline) = match (seal(vector.plaintext, secret), seal("", secret)) {
        (Ok(s), Ok(b)) => (s, b),
        (Err(e), _) | (_, Err(e)) => return fail(String::new(), e.to_string()),
    };
    let hex = sealed.to_hex();

    if hex != vector.expected_sealed {
        return fail(hex, format!("expected envelope {}", vector.expected_sealed));
    }

    let Some(block) = plain_block(vector.plaintext) else {
        return fail(hex, "plaintext does not fit".into());
    };
    // The empty block is all zeros, so the baseline envelope is the key stream.
    let mut masked = [0u8; ENVELOPE_WIDTH];
    for (i, byte) in masked.iter_mut().enumerate() {
        *byte = sealed.as_bytes()[i] ^ baseline.as_bytes()[i];
    }
    if masked != block {
        return fail(hex, "envelope is not block XOR key stream".into());
    }

    match open(&sealed, secret) {
        Ok(text) if text == vector.plaintext => VectorReport {
            name: vector.name.to_string(),
            block: block_hex.clone(),
            sealed: hex,
            passed: true,
            detail: None,
        },
        Ok(text) => fail(hex, format!("opened to {:?}", text)),
        Err(e) => fail(hex, e.to_string()),
    }
}

/// Check every vector.
pub fn verify_all_vectors() -> Vec<VectorReport> {
    all_vectors().iter().map(check_vector).collect()
}

/// Vector reports as pretty JSON, for comparison with other clients.
pub fn vectors_json() -> serde_json::Result<String> {
    serde_json::to_string_pretty(&verify_all_vectors())
}
