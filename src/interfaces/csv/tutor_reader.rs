use crate::domain::booking::TutorProfile;
use crate::domain::identity::UserId;
use crate::domain::money::Money;
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct TutorRow {
    tutor: String,
    name: String,
    rate: Decimal,
}

/// Reads the tutor catalog (`tutor, name, rate`) used to seed the in-memory
/// catalog.
pub struct TutorReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> TutorReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        Self { reader }
    }

    pub fn tutors(self) -> impl Iterator<Item = Result<TutorProfile>> {
        self.reader.into_deserialize().map(|result| {
            let row: TutorRow = result.map_err(LedgerError::from)?;
            if row.tutor.is_empty() {
                return Err(LedgerError::ValidationError(
                    "tutor id must not be empty".to_string(),
                ));
            }
            let profile = TutorProfile {
                tutor: UserId::new(row.tutor),
                display_name: row.name,
                hourly_rate: Money::new(row.rate)?,
            };
            profile.validate()?;
            Ok(profile)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reads_tutors() {
        let data = "tutor, name, rate\nt1, Ada Reyes, 300\nt2, Ben Cruz, 412.5";
        let tutors: Vec<_> = TutorReader::new(data.as_bytes())
            .tutors()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(tutors.len(), 2);
        assert_eq!(tutors[0].display_name, "Ada Reyes");
        assert_eq!(tutors[1].hourly_rate.value(), dec!(412.50));
    }

    #[test]
    fn test_negative_rate_is_rejected() {
        let data = "tutor, name, rate\nt1, Ada Reyes, -5";
        let result: Vec<_> = TutorReader::new(data.as_bytes()).tutors().collect();
        assert!(matches!(result[0], Err(LedgerError::ValidationError(_))));
    }

    #[test]
    fn test_rate_above_ceiling_is_rejected() {
        let data = "tutor, name, rate\nt1, Ada Reyes, 79228162514264337593543950335";
        let result: Vec<_> = TutorReader::new(data.as_bytes()).tutors().collect();
        assert!(matches!(result[0], Err(LedgerError::ValidationError(_))));
    }
}
