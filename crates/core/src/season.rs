//! KMS (Kharif Marketing Season) year labels.
//!
//! Every arrival and stock row is partitioned by a season label such as
//! `"2024-25"`. The season runs 1 October through 30 September.

use core::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_object::ValueObject;

/// A validated KMS year label ("YYYY-YY", consecutive years).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KmsYear {
    starting_year: i32,
}

impl KmsYear {
    /// Season starting 1 October of `starting_year`.
    pub fn starting(starting_year: i32) -> Self {
        Self { starting_year }
    }

    /// The season a calendar date falls into (October–September).
    pub fn containing(date: NaiveDate) -> Self {
        let starting_year = if date.month() >= 10 {
            date.year()
        } else {
            date.year() - 1
        };
        Self { starting_year }
    }

    pub fn starting_year(&self) -> i32 {
        self.starting_year
    }

    pub fn label(&self) -> String {
        format!("{}-{:02}", self.starting_year, (self.starting_year + 1) % 100)
    }
}

impl core::fmt::Display for KmsYear {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for KmsYear {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| DomainError::validation("KMS year must look like \"2024-25\""))?;

        let starting_year: i32 = start
            .parse()
            .map_err(|_| DomainError::validation("KMS year must start with a 4-digit year"))?;
        if !(1900..=9999).contains(&starting_year) || start.len() != 4 {
            return Err(DomainError::validation("KMS year must start with a 4-digit year"));
        }

        let ending: i32 = end
            .parse()
            .map_err(|_| DomainError::validation("KMS year must end with a 2-digit year"))?;
        if end.len() != 2 || ending != (starting_year + 1) % 100 {
            return Err(DomainError::validation(
                "KMS year must span two consecutive years (e.g. \"2024-25\")",
            ));
        }

        Ok(Self { starting_year })
    }
}

impl TryFrom<String> for KmsYear {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<KmsYear> for String {
    fn from(value: KmsYear) -> Self {
        value.label()
    }
}

impl ValueObject for KmsYear {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats_labels() {
        let y: KmsYear = "2024-25".parse().unwrap();
        assert_eq!(y.starting_year(), 2024);
        assert_eq!(y.label(), "2024-25");

        // Century rollover.
        let y: KmsYear = "2099-00".parse().unwrap();
        assert_eq!(y.label(), "2099-00");
    }

    #[test]
    fn rejects_malformed_labels() {
        assert!("2024".parse::<KmsYear>().is_err());
        assert!("2024-26".parse::<KmsYear>().is_err());
        assert!("24-25".parse::<KmsYear>().is_err());
        assert!("2024-5".parse::<KmsYear>().is_err());
    }

    #[test]
    fn season_window_runs_october_to_september() {
        let oct = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();
        let sep = NaiveDate::from_ymd_opt(2025, 9, 30).unwrap();
        assert_eq!(KmsYear::containing(oct), KmsYear::starting(2024));
        assert_eq!(KmsYear::containing(sep), KmsYear::starting(2024));
        let jan = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(KmsYear::containing(jan), KmsYear::starting(2023));
    }
}
