//! Streaming CSV row reader and per-row validation.
//!
//! The first record is the header: each token is trimmed and lowercased and
//! columns are matched by name. Data rows are tagged with their 1-based source
//! line (the header is line 1). Validation never aborts the import; a bad row
//! becomes a [`RowFailure`].

use std::io::Read;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use super::ImportError;
use crate::canonical::canonical_key;
use crate::db::{ClientMeta, NewClient};

pub const COMPANY_NAME_MAX: usize = 255;
pub const EMAIL_MAX: usize = 255;
pub const PHONE_NUMBER_MAX: usize = 50;

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let label = "[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?";
        Regex::new(&format!(
            r"^[A-Za-z0-9.!#$%&'*+/=?^_`{{|}}~-]+@{label}(?:\.{label})*$"
        ))
        .unwrap()
    })
}

/// Field-level reasons a row is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("The company name field is required.")]
    CompanyNameRequired,

    #[error("The company name field must not be greater than 255 characters.")]
    CompanyNameTooLong,

    #[error("The email field must be a valid email address.")]
    EmailInvalid,

    #[error("The email field must not be greater than 255 characters.")]
    EmailTooLong,

    #[error("The phone number field must not be greater than 50 characters.")]
    PhoneNumberTooLong,

    #[error("The row could not be parsed: {0}")]
    Malformed(String),
}

/// One data row mapped against the header, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub row_number: u64,
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    /// Non-empty values from columns other than the three recognized ones.
    pub extra: ClientMeta,
}

/// A row that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRow {
    pub row_number: u64,
    pub client: NewClient,
}

impl ValidRow {
    pub fn canonical_key(&self) -> String {
        canonical_key(
            &self.client.company_name,
            self.client.email.as_deref(),
            self.client.phone_number.as_deref(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    pub row_number: u64,
    pub errors: Vec<FieldError>,
}

impl RowFailure {
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

/// Validate a mapped row.
pub fn validate(raw: RawRow) -> Result<ValidRow, RowFailure> {
    let mut errors = Vec::new();

    let company_name = raw.company_name.unwrap_or_default();
    if company_name.is_empty() {
        errors.push(FieldError::CompanyNameRequired);
    } else if company_name.chars().count() > COMPANY_NAME_MAX {
        errors.push(FieldError::CompanyNameTooLong);
    }

    if let Some(email) = raw.email.as_deref() {
        if !email_re().is_match(email) {
            errors.push(FieldError::EmailInvalid);
        }
        if email.chars().count() > EMAIL_MAX {
            errors.push(FieldError::EmailTooLong);
        }
    }

    if let Some(phone) = raw.phone_number.as_deref() {
        if phone.chars().count() > PHONE_NUMBER_MAX {
            errors.push(FieldError::PhoneNumberTooLong);
        }
    }

    if !errors.is_empty() {
        return Err(RowFailure {
            row_number: raw.row_number,
            errors,
        });
    }

    Ok(ValidRow {
        row_number: raw.row_number,
        client: NewClient {
            company_name,
            email: raw.email,
            phone_number: raw.phone_number,
            meta: (!raw.extra.is_empty()).then_some(raw.extra),
        },
    })
}

/// Trimmed value, or `None` when missing or blank.
fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Pulls one record at a time from a CSV byte stream.
pub struct RowReader<R: Read> {
    csv: csv::Reader<R>,
    header: Vec<String>,
    record: csv::StringRecord,
    rows_read: u64,
}

impl<R: Read> RowReader<R> {
    /// Read the header. A stream with no records is [`ImportError::EmptyFile`].
    pub fn new(input: R) -> Result<Self, ImportError> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(input);

        let mut record = csv::StringRecord::new();
        if !csv.read_record(&mut record)? {
            return Err(ImportError::EmptyFile);
        }
        let header = record
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_lowercase())
            .collect();

        Ok(Self {
            csv,
            header,
            record,
            rows_read: 1,
        })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Next data row, validated. `Ok(None)` at end of stream; `Err` only for
    /// an I/O failure of the underlying reader.
    pub fn next_row(&mut self) -> Result<Option<Result<ValidRow, RowFailure>>, ImportError> {
        match self.csv.read_record(&mut self.record) {
            Ok(false) => Ok(None),
            Ok(true) => {
                self.rows_read += 1;
                let row_number = self
                    .record
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(self.rows_read);
                Ok(Some(validate(self.map_record(row_number))))
            }
            Err(e) if e.is_io_error() => Err(ImportError::Csv(e)),
            Err(e) => {
                self.rows_read += 1;
                let row_number = e
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(self.rows_read);
                Ok(Some(Err(RowFailure {
                    row_number,
                    errors: vec![FieldError::Malformed(e.to_string())],
                })))
            }
        }
    }

    fn map_record(&self, row_number: u64) -> RawRow {
        let mut raw = RawRow {
            row_number,
            ..RawRow::default()
        };
        for (i, column) in self.header.iter().enumerate() {
            let value = non_empty(self.record.get(i));
            match column.as_str() {
                "company_name" => raw.company_name = value,
                "email" => raw.email = value,
                "phone_number" => raw.phone_number = value,
                "" => {}
                other => {
                    if let Some(v) = value {
                        raw.extra.insert(other.to_string(), serde_json::Value::String(v));
                    }
                }
            }
        }
        raw
    }
}
