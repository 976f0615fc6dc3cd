//! Canonical identity key for client records.
//!
//! `company|email|phone` where company and email are trimmed and lowercased
//! and phone keeps only its ASCII digits. Missing optional fields become the
//! empty string, so the function is total.

pub fn canonical_key(
    company_name: &str,
    email: Option<&str>,
    phone_number: Option<&str>,
) -> String {
    let company = company_name.trim().to_lowercase();
    let email = email.map(|e| e.trim().to_lowercase()).unwrap_or_default();
    let phone: String = phone_number
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();

    let mut key = String::with_capacity(company.len() + email.len() + phone.len() + 2);
    key.push_str(&company);
    key.push('|');
    key.push_str(&email);
    key.push('|');
    key.push_str(&phone);
    key
}
