//! Dialect profiles for the three historical CAOS families.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The grammar family a dialect belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    C1,
    C2,
    C3,
}

impl Family {
    pub fn bit(self) -> u8 {
        match self {
            Family::C1 => 0b001,
            Family::C2 => 0b010,
            Family::C3 => 0b100,
        }
    }
}

/// A named dialect selected by the caller at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    C1,
    C2,
    C3,
    Cv,
    Sm,
}

const ALL_DIALECTS: [Dialect; 5] = [Dialect::C1, Dialect::C2, Dialect::C3, Dialect::Cv, Dialect::Sm];

impl Dialect {
    /// Resolve a dialect by its short name (`c1`, `c2`, `c3`, `cv`, `sm`).
    pub fn from_name(name: &str) -> Option<Dialect> {
        match name.trim().to_ascii_lowercase().as_str() {
            "c1" => Some(Dialect::C1),
            "c2" => Some(Dialect::C2),
            "c3" => Some(Dialect::C3),
            "cv" => Some(Dialect::Cv),
            "sm" => Some(Dialect::Sm),
            _ => None,
        }
    }

    pub fn all() -> &'static [Dialect] {
        &ALL_DIALECTS
    }

    pub fn name(self) -> &'static str {
        match self {
            Dialect::C1 => "c1",
            Dialect::C2 => "c2",
            Dialect::C3 => "c3",
            Dialect::Cv => "cv",
            Dialect::Sm => "sm",
        }
    }

    pub fn family(self) -> Family {
        match self {
            Dialect::C1 => Family::C1,
            Dialect::C2 => Family::C2,
            Dialect::C3 | Dialect::Cv | Dialect::Sm => Family::C3,
        }
    }

    fn is_classic(self) -> bool {
        matches!(self.family(), Family::C1 | Family::C2)
    }

    /// Commas separate tokens in the classic families and are rejected in C3.
    pub fn commas_are_whitespace(self) -> bool {
        self.is_classic()
    }

    pub fn allows_float_literals(self) -> bool {
        !self.is_classic()
    }

    pub fn allows_char_literals(self) -> bool {
        !self.is_classic()
    }

    /// Bracket literals hold raw text in C1/C2 and decimal byte lists in C3.
    pub fn bracket_literals_are_text(self) -> bool {
        self.is_classic()
    }

    pub fn allows_elif(self) -> bool {
        !self.is_classic()
    }

    /// Highest `OBVn` index accepted, if the family has that spelling.
    pub fn max_obv(self) -> Option<u8> {
        match self.family() {
            Family::C1 => Some(2),
            Family::C2 => Some(9),
            Family::C3 => None,
        }
    }

    pub fn allows_var_digit(self) -> bool {
        self.is_classic()
    }

    pub fn allows_two_digit_vars(self) -> bool {
        !matches!(self.family(), Family::C1)
    }

    pub fn allows_owner_vars(self) -> bool {
        !self.is_classic()
    }

    /// Barewords may stand in for string arguments (sprite names) in C1/C2.
    pub fn allows_bareword_strings(self) -> bool {
        self.is_classic()
    }

    /// Default per-tick instruction quantum.
    pub fn default_timeslice(self) -> u32 {
        if self.is_classic() {
            1
        } else {
            5
        }
    }

    /// Cost charged for evaluating a flow construct (DOIF, UNTL, REPE, NEXT, ...).
    pub fn flow_cost(self) -> u32 {
        if self.is_classic() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_is_case_insensitive() {
        assert_eq!(Dialect::from_name("C3"), Some(Dialect::C3));
        assert_eq!(Dialect::from_name("sm"), Some(Dialect::Sm));
        assert_eq!(Dialect::from_name("unknown dialect"), None);
    }

    #[test]
    fn test_families() {
        assert_eq!(Dialect::Cv.family(), Family::C3);
        assert_eq!(Dialect::C2.family(), Family::C2);
        assert!(Dialect::C1.commas_are_whitespace());
        assert!(!Dialect::C3.commas_are_whitespace());
        assert_eq!(Dialect::C1.default_timeslice(), 1);
        assert_eq!(Dialect::Sm.default_timeslice(), 5);
    }
}
