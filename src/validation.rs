//! Input checks for the conversation flows. Every function returns the
//! cleaned value or `AppError::Validation` with a message fit for a re-prompt.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::AppError;

pub const MAX_EXPERIENCE_YEARS: u8 = 70;
pub const MIN_VEHICLE_MODEL_LEN: usize = 3;
pub const PLATE_LEN: std::ops::RangeInclusive<usize> = 6..=9;
pub const MAX_COMMENT_LEN: usize = 500;

static PHONE_RE: OnceLock<Regex> = OnceLock::new();

fn phone_regex() -> &'static Regex {
    PHONE_RE.get_or_init(|| {
        Regex::new(r"^(\+7|8)[0-9]{10}$")
            .unwrap_or_else(|error| panic!("phone regex failed to compile: {error}"))
    })
}

/// Strips control characters from free text.
pub fn sanitize_input(text: &str) -> String {
    text.chars().filter(|c| !c.is_control()).collect()
}

/// Accepts `+7XXXXXXXXXX` or `8XXXXXXXXXX` with optional spaces, dashes and
/// parentheses. Returns the canonical `+7XXXXXXXXXX` form.
pub fn validate_phone(raw: &str) -> Result<String, AppError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')'))
        .collect();

    if !phone_regex().is_match(&cleaned) {
        return Err(AppError::Validation(
            "phone must look like +79991234567 or 89991234567".to_string(),
        ));
    }

    let subscriber = cleaned.trim_start_matches("+7");
    let subscriber = if subscriber.len() == 11 {
        subscriber.get(1..).unwrap_or(subscriber)
    } else {
        subscriber
    };

    Ok(format!("+7{subscriber}"))
}

/// Renders a canonical phone as `+7 (999) 123-45-67`.
pub fn format_phone(phone: &str) -> String {
    let digits = phone.trim_start_matches("+7");
    match (
        digits.get(0..3),
        digits.get(3..6),
        digits.get(6..8),
        digits.get(8..10),
    ) {
        (Some(area), Some(first), Some(second), Some(third)) if digits.len() == 10 => {
            format!("+7 ({area}) {first}-{second}-{third}")
        }
        _ => phone.to_string(),
    }
}

pub fn validate_full_name(raw: &str) -> Result<String, AppError> {
    let name = sanitize_input(raw).trim().to_string();
    if name.split_whitespace().count() < 2 {
        return Err(AppError::Validation(
            "enter first and last name".to_string(),
        ));
    }
    Ok(name)
}

pub fn validate_vehicle_model(raw: &str) -> Result<String, AppError> {
    let model = sanitize_input(raw).trim().to_string();
    if model.chars().count() < MIN_VEHICLE_MODEL_LEN {
        return Err(AppError::Validation("vehicle model is too short".to_string()));
    }
    Ok(model)
}

pub fn validate_plate(raw: &str) -> Result<String, AppError> {
    let plate: String = sanitize_input(raw)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();

    if !PLATE_LEN.contains(&plate.chars().count()) || !plate.chars().all(char::is_alphanumeric) {
        return Err(AppError::Validation(
            "plate must be 6 to 9 letters or digits, e.g. A123BC77".to_string(),
        ));
    }
    Ok(plate)
}

pub fn validate_experience(raw: &str) -> Result<u8, AppError> {
    raw.trim()
        .parse::<u8>()
        .ok()
        .filter(|years| *years <= MAX_EXPERIENCE_YEARS)
        .ok_or_else(|| {
            AppError::Validation(format!("enter a number from 0 to {MAX_EXPERIENCE_YEARS}"))
        })
}

pub fn validate_rating(rating: u8) -> Result<u8, AppError> {
    if (1..=5).contains(&rating) {
        Ok(rating)
    } else {
        Err(AppError::Validation("rating must be from 1 to 5".to_string()))
    }
}

/// Empty comments become `None`.
pub fn validate_comment(raw: &str) -> Result<Option<String>, AppError> {
    let comment = sanitize_input(raw).trim().to_string();
    if comment.chars().count() > MAX_COMMENT_LEN {
        return Err(AppError::Validation(format!(
            "comment is longer than {MAX_COMMENT_LEN} characters"
        )));
    }
    Ok(Some(comment).filter(|c| !c.is_empty()))
}
