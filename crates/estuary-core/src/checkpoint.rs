//! Layer 1: Checkpoint
//!
//! How far the server has ingested (`server_seq`) and how much of this
//! replica's output it has acknowledged (`client_seq`). Forwarding is
//! per-field max, so a checkpoint never moves backwards.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checkpoint {
    pub server_seq: u64,
    pub client_seq: u32,
}

impl Checkpoint {
    pub const INITIAL: Checkpoint = Checkpoint {
        server_seq: 0,
        client_seq: 0,
    };

    pub fn new(server_seq: u64, client_seq: u32) -> Self {
        Self {
            server_seq,
            client_seq,
        }
    }

    /// Monotone merge: each field takes its maximum.
    pub fn forward(&self, other: &Checkpoint) -> Checkpoint {
        Checkpoint {
            server_seq: self.server_seq.max(other.server_seq),
            client_seq: self.client_seq.max(other.client_seq),
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "serverSeq={}, clientSeq={}",
            self.server_seq, self.client_seq
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn forward_takes_per_field_max() {
        let a = Checkpoint::new(3, 7);
        let b = Checkpoint::new(5, 2);
        assert_eq!(a.forward(&b), Checkpoint::new(5, 7));
    }

    #[test]
    fn forward_never_regresses() {
        let a = Checkpoint::new(9, 9);
        assert_eq!(a.forward(&Checkpoint::INITIAL), a);
    }

    fn checkpoint_strategy() -> impl Strategy<Value = Checkpoint> {
        (0u64..100, 0u32..100).prop_map(|(s, c)| Checkpoint::new(s, c))
    }

    proptest! {
        #[test]
        fn prop_forward_commutative(a in checkpoint_strategy(), b in checkpoint_strategy()) {
            prop_assert_eq!(a.forward(&b), b.forward(&a));
        }

        #[test]
        fn prop_forward_dominates_both(a in checkpoint_strategy(), b in checkpoint_strategy()) {
            let f = a.forward(&b);
            prop_assert!(f.server_seq >= a.server_seq && f.server_seq >= b.server_seq);
            prop_assert!(f.client_seq >= a.client_seq && f.client_seq >= b.client_seq);
        }
    }
}
