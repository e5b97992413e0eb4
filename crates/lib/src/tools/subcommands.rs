//! Closed subcommand allowlist. Each entry maps a name to its argument shape;
//! adding a subcommand is a new table row.

use crate::error::GatewayError;

/// Rule for one positional argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Any,
    /// `@` followed by 1..=64 chars from `[A-Za-z0-9._:-]`.
    ElementRef,
    /// Not empty after trimming.
    NonEmpty,
}

/// Argument shape accepted by a subcommand.
#[derive(Debug, Clone, Copy)]
pub enum Shape {
    /// Positional arguments: count bounds plus per-position rules (unlisted positions are `Any`).
    Positional {
        min: usize,
        max: Option<usize>,
        slots: &'static [Slot],
    },
    /// Only the flags in [`SNAPSHOT_BOOL_FLAGS`] and [`SNAPSHOT_VALUE_FLAGS`].
    SnapshotFlags,
}

#[derive(Debug, Clone, Copy)]
pub struct Subcommand {
    pub name: &'static str,
    pub shape: Shape,
}

const fn exact(n: usize, slots: &'static [Slot]) -> Shape {
    Shape::Positional {
        min: n,
        max: Some(n),
        slots,
    }
}

const fn at_least(n: usize, slots: &'static [Slot]) -> Shape {
    Shape::Positional {
        min: n,
        max: None,
        slots,
    }
}

const ONE_REF: &[Slot] = &[Slot::ElementRef];
const ONE_NON_EMPTY: &[Slot] = &[Slot::NonEmpty];
const REF_THEN_VALUE: &[Slot] = &[Slot::ElementRef, Slot::NonEmpty];

/// Navigation subcommand; its single argument goes through the egress policy.
pub const OPEN: &str = "open";

pub const SUBCOMMANDS: &[Subcommand] = &[
    Subcommand { name: OPEN, shape: exact(1, ONE_NON_EMPTY) },
    Subcommand { name: "snapshot", shape: Shape::SnapshotFlags },
    Subcommand { name: "click", shape: exact(1, ONE_REF) },
    Subcommand { name: "dblclick", shape: exact(1, ONE_REF) },
    Subcommand { name: "hover", shape: exact(1, ONE_REF) },
    Subcommand { name: "focus", shape: exact(1, ONE_REF) },
    Subcommand { name: "check", shape: exact(1, ONE_REF) },
    Subcommand { name: "uncheck", shape: exact(1, ONE_REF) },
    Subcommand { name: "type", shape: at_least(2, REF_THEN_VALUE) },
    Subcommand { name: "fill", shape: at_least(2, REF_THEN_VALUE) },
    Subcommand { name: "select", shape: at_least(2, REF_THEN_VALUE) },
    Subcommand { name: "press", shape: exact(1, ONE_NON_EMPTY) },
    Subcommand { name: "wait", shape: exact(1, ONE_NON_EMPTY) },
    Subcommand {
        name: "screenshot",
        shape: Shape::Positional { min: 0, max: Some(1), slots: &[] },
    },
    Subcommand { name: "close", shape: exact(0, &[]) },
];

pub const SNAPSHOT_BOOL_FLAGS: &[&str] = &["-i", "--interactive", "-c", "--compact"];
pub const SNAPSHOT_VALUE_FLAGS: &[&str] = &["-d", "--depth", "-s", "--selector"];

const MAX_REF_LEN: usize = 64;

pub fn lookup(name: &str) -> Option<&'static Subcommand> {
    SUBCOMMANDS.iter().find(|s| s.name == name)
}

/// Subcommand names in table order (for the tool description).
pub fn names() -> impl Iterator<Item = &'static str> {
    SUBCOMMANDS.iter().map(|s| s.name)
}

pub fn is_element_ref(s: &str) -> bool {
    let Some(rest) = s.strip_prefix('@') else {
        return false;
    };
    !rest.is_empty()
        && rest.len() <= MAX_REF_LEN
        && rest
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'-'))
}

/// Check that `args` fit the shape declared for `subcommand`.
pub fn check_arity(subcommand: &str, args: &[String]) -> Result<(), GatewayError> {
    let sub = lookup(subcommand).ok_or_else(|| {
        GatewayError::validation(format!("disallowed subcommand: {}", subcommand))
    })?;
    match sub.shape {
        Shape::SnapshotFlags => check_snapshot_flags(args),
        Shape::Positional { min, max, slots } => {
            check_count(sub.name, args.len(), min, max)?;
            for (i, (arg, slot)) in args.iter().zip(slots.iter()).enumerate() {
                check_slot(sub.name, i, arg, *slot)?;
            }
            Ok(())
        }
    }
}

fn check_count(name: &str, n: usize, min: usize, max: Option<usize>) -> Result<(), GatewayError> {
    let msg = match max {
        Some(0) if n > 0 => format!("{} takes no arguments", name),
        Some(m) if m == min && n != m => format!(
            "{} expects exactly {} argument{}",
            name,
            m,
            if m == 1 { "" } else { "s" }
        ),
        Some(m) if n > m => format!("{} expects at most {} argument(s)", name, m),
        _ if n < min => format!("{} expects at least {} arguments", name, min),
        _ => return Ok(()),
    };
    Err(GatewayError::validation(msg))
}

fn check_slot(name: &str, index: usize, arg: &str, slot: Slot) -> Result<(), GatewayError> {
    let ok = match slot {
        Slot::Any => true,
        Slot::ElementRef => is_element_ref(arg),
        Slot::NonEmpty => !arg.trim().is_empty(),
    };
    if ok {
        return Ok(());
    }
    let what = match slot {
        Slot::ElementRef => "an element reference like @e1",
        _ => "non-empty",
    };
    Err(GatewayError::validation(format!(
        "{}: argument {} must be {}",
        name,
        index + 1,
        what
    )))
}

/// Flags are taken as a set; value flags consume the next token, which may not look like a flag.
fn check_snapshot_flags(args: &[String]) -> Result<(), GatewayError> {
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        if SNAPSHOT_BOOL_FLAGS.contains(&arg.as_str()) {
            continue;
        }
        if SNAPSHOT_VALUE_FLAGS.contains(&arg.as_str()) {
            match it.next() {
                Some(v) if !v.starts_with('-') && !v.trim().is_empty() => continue,
                _ => {
                    return Err(GatewayError::validation(format!(
                        "snapshot: {} requires a value",
                        arg
                    )))
                }
            }
        }
        return Err(GatewayError::validation(format!(
            "snapshot: unsupported argument: {}",
            arg
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn unknown_subcommands_are_rejected_regardless_of_args() {
        for name in ["eval", "evaluate", "Open", "js", "", "open "] {
            for a in [args(&[]), args(&["x"]), args(&["@e1", "y"])] {
                let err = check_arity(name, &a).unwrap_err();
                assert!(err.to_string().contains("disallowed subcommand"));
            }
        }
    }

    #[test]
    fn element_reference_shape() {
        assert!(is_element_ref("@e1"));
        assert!(is_element_ref("@frame:3.btn_a-b"));
        assert!(is_element_ref(&format!("@{}", "x".repeat(64))));
        assert!(!is_element_ref("@"));
        assert!(!is_element_ref("e1"));
        assert!(!is_element_ref("@e 1"));
        assert!(!is_element_ref(&format!("@{}", "x".repeat(65))));
        assert!(!is_element_ref("@e1;rm"));
    }

    #[test]
    fn click_family_requires_one_reference() {
        for name in ["click", "dblclick", "hover", "focus", "check", "uncheck"] {
            assert!(check_arity(name, &args(&["@e1"])).is_ok());
            assert!(check_arity(name, &args(&[])).is_err());
            assert!(check_arity(name, &args(&["@e1", "@e2"])).is_err());
            assert!(check_arity(name, &args(&["button"])).is_err());
        }
    }

    #[test]
    fn fill_family_requires_reference_and_value() {
        for name in ["type", "fill", "select"] {
            assert!(check_arity(name, &args(&["@e1", "hello"])).is_ok());
            assert!(check_arity(name, &args(&["@e1", "a", "b"])).is_ok());
            assert!(check_arity(name, &args(&["@e1"])).is_err());
            assert!(check_arity(name, &args(&["@e1", "  "])).is_err());
            assert!(check_arity(name, &args(&["e1", "hello"])).is_err());
        }
    }

    #[test]
    fn open_press_wait_need_one_non_empty() {
        for name in ["open", "press", "wait"] {
            assert!(check_arity(name, &args(&["x"])).is_ok());
            assert!(check_arity(name, &args(&[" "])).is_err());
            assert!(check_arity(name, &args(&[])).is_err());
            assert!(check_arity(name, &args(&["x", "y"])).is_err());
        }
    }

    #[test]
    fn screenshot_and_close_bounds() {
        assert!(check_arity("screenshot", &args(&[])).is_ok());
        assert!(check_arity("screenshot", &args(&["shot.png"])).is_ok());
        assert!(check_arity("screenshot", &args(&["a", "b"])).is_err());
        assert!(check_arity("close", &args(&[])).is_ok());
        let err = check_arity("close", &args(&["now"])).unwrap_err();
        assert!(err.to_string().contains("no arguments"));
    }

    #[test]
    fn snapshot_accepts_allowlisted_flags() {
        assert!(check_arity("snapshot", &args(&[])).is_ok());
        assert!(check_arity("snapshot", &args(&["-i", "--compact"])).is_ok());
        assert!(check_arity("snapshot", &args(&["-d", "3", "-s", "#main"])).is_ok());
        assert!(check_arity("snapshot", &args(&["--depth", "2", "--interactive"])).is_ok());
    }

    #[test]
    fn snapshot_rejects_other_shapes() {
        assert!(check_arity("snapshot", &args(&["@e1"])).is_err());
        assert!(check_arity("snapshot", &args(&["--eval"])).is_err());
        assert!(check_arity("snapshot", &args(&["-d"])).is_err());
        assert!(check_arity("snapshot", &args(&["-d", "-i"])).is_err());
        assert!(check_arity("snapshot", &args(&["-s", ""])).is_err());
    }
}
