use rand::Rng;

/// Next nick to try after the server refused the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NickChoice {
    pub nick: String,
    /// The nick only differs from the preferred one by a numeric suffix.
    /// Such nicks are not worth sending once registration is complete.
    pub numeric: bool,
}

/// Walk the fallback ladder: a random three digit suffix first when the
/// server forced something unrelated on us, then `nick_`, then a random
/// digit, and from there on one more digit per attempt.
pub fn next_nick<R: Rng + ?Sized>(preferred: &str, current: &str, rng: &mut R) -> NickChoice {
    let underscored = format!("{preferred}_");

    if !current.starts_with(preferred) {
        return NickChoice {
            nick: format!("{preferred}{}", rng.gen_range(100..1000)),
            numeric: false,
        };
    }

    if current == preferred {
        return NickChoice {
            nick: underscored,
            numeric: false,
        };
    }

    if current == underscored {
        return NickChoice {
            nick: format!("{preferred}{}", rng.gen_range(0..10)),
            numeric: true,
        };
    }

    NickChoice {
        nick: format!("{current}{}", rng.gen_range(0..10)),
        numeric: true,
    }
}
