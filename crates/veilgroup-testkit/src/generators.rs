//! Proptest generators for property-based testing.

use proptest::prelude::*;

use veilgroup_core::{GroupSecret, Handle, Keypair, Principal, MAX_PAYLOAD_LEN};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a principal backed by a real keypair.
pub fn principal() -> impl Strategy<Value = Principal> {
    keypair().prop_map(|kp| kp.principal())
}

/// Generate a random handle.
pub fn handle() -> impl Strategy<Value = Handle> {
    any::<[u8; 32]>().prop_map(Handle::from_bytes)
}

/// Generate a group secret.
pub fn group_secret() -> impl Strategy<Value = GroupSecret> {
    any::<u64>().prop_map(GroupSecret)
}

/// Generate a non-empty group name.
pub fn group_name() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9 _-]{0,23}".prop_map(String::from)
}

/// Generate any UTF-8 text that fits in an envelope.
///
/// Characters are drawn from the whole Unicode range and the string is cut
/// at the last character that still fits.
pub fn plaintext() -> impl Strategy<Value = String> {
    prop::collection::vec(any::<char>(), 0..=MAX_PAYLOAD_LEN).prop_map(|chars| {
        let mut text = String::new();
        for c in chars {
            if text.len() + c.len_utf8() > MAX_PAYLOAD_LEN {
                break;
            }
            text.push(c);
        }
        text
    })
}

/// Generate ASCII text too long for an envelope.
pub fn oversized_plaintext() -> impl Strategy<Value = String> {
    "[ -~]{32,96}".prop_map(String::from)
}

/// One step of a group's history.
#[derive(Debug, Clone)]
pub enum GroupStep {
    /// Party `seed` joins (ignored if already a member).
    Join(u8),
    /// Party `seed` sends `text` (ignored if not a member).
    Send(u8, String),
}

/// Parameters for a scripted group history.
///
/// Party seeds are drawn from a small range so scripts revisit the same
/// parties: repeat joins and sends by non-members are both common.
#[derive(Debug, Clone)]
pub struct ScriptParams {
    pub name: String,
    pub creator: u8,
    pub steps: Vec<GroupStep>,
}

/// Generate a single step with party seeds in `1..=parties`.
pub fn group_step(parties: u8) -> impl Strategy<Value = GroupStep> {
    prop_oneof![
        (1..=parties).prop_map(GroupStep::Join),
        ((1..=parties), "[a-z ]{0,31}").prop_map(|(seed, text)| GroupStep::Send(seed, text)),
    ]
}

impl Arbitrary for ScriptParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            group_name(),
            1u8..=6u8,                                  // creator
            prop::collection::vec(group_step(6), 0..24), // steps
        )
            .prop_map(|(name, creator, steps)| ScriptParams {
                name,
                creator,
                steps,
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veilgroup_core::{open, seal};

    proptest! {
        #[test]
        fn test_plaintext_always_fits(text in plaintext()) {
            prop_assert!(text.len() <= MAX_PAYLOAD_LEN);
        }

        #[test]
        fn test_oversized_never_fits(text in oversized_plaintext(), secret in group_secret()) {
            prop_assert!(seal(&text, secret).is_err());
        }

        #[test]
        fn test_generated_text_roundtrips(text in plaintext(), secret in group_secret()) {
            let sealed = seal(&text, secret).unwrap();
            prop_assert_eq!(open(&sealed, secret).unwrap(), text);
        }

        #[test]
        fn test_script_seeds_in_range(params: ScriptParams) {
            prop_assert!((1..=6).contains(&params.creator));
            for step in &params.steps {
                let seed = match step {
                    GroupStep::Join(seed) | GroupStep::Send(seed, _) => *seed,
                };
                prop_assert!((1..=6).contains(&seed));
            }
        }
    }
}
