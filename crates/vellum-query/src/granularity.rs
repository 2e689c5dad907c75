use std::fmt;
use std::str::FromStr;

use crate::error::StageError;

/// Preferred-number series accepted by `$bucketAuto`'s `granularity` option.
///
/// Each names a fixed table of mantissa values in `[1, 10)` replicated
/// across decimal decades (power-of-2 excepted, which doubles instead).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    PowersOf2,
    OneTwoFive,
    R5,
    R10,
    R20,
    R40,
    R80,
    E6,
    E12,
    E24,
    E48,
    E96,
    E192,
}

impl Granularity {
    pub const ALL: [Granularity; 13] = [
        Granularity::PowersOf2,
        Granularity::OneTwoFive,
        Granularity::R5,
        Granularity::R10,
        Granularity::R20,
        Granularity::R40,
        Granularity::R80,
        Granularity::E6,
        Granularity::E12,
        Granularity::E24,
        Granularity::E48,
        Granularity::E96,
        Granularity::E192,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::PowersOf2 => "POWERSOF2",
            Granularity::OneTwoFive => "1-2-5",
            Granularity::R5 => "R5",
            Granularity::R10 => "R10",
            Granularity::R20 => "R20",
            Granularity::R40 => "R40",
            Granularity::R80 => "R80",
            Granularity::E6 => "E6",
            Granularity::E12 => "E12",
            Granularity::E24 => "E24",
            Granularity::E48 => "E48",
            Granularity::E96 => "E96",
            Granularity::E192 => "E192",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Granularity::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| {
                StageError::new(40257, format!("Rounding granularity not recognized: {s}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_literals_roundtrip() {
        for g in Granularity::ALL {
            assert_eq!(g.as_str().parse::<Granularity>().unwrap(), g);
        }
    }

    #[test]
    fn unknown_literal_rejected_with_code() {
        let err = "R7".parse::<Granularity>().unwrap_err();
        assert_eq!(err.code, 40257);
    }
}
