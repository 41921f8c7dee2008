use scraper::{Html, Selector};

use crate::config::Credentials;
use crate::error::AuthFailure;

/// Anti-forgery fields the portal's login form always carries.
pub const REQUIRED_HIDDEN_FIELDS: [&str; 3] =
    ["__VIEWSTATE", "__VIEWSTATEGENERATOR", "__EVENTVALIDATION"];

const USERNAME_FIELD: &str = "ctl00$MainContent$username";
const PASSWORD_FIELD: &str = "ctl00$MainContent$password";
const SUBMIT_FIELD: &str = "ctl00$MainContent$Submit1";

/// Collects every hidden input of the login page, failing if one of the
/// required anti-forgery fields is absent.
pub fn parse_hidden_fields(markup: &str) -> Result<Vec<(String, String)>, AuthFailure> {
    let document = Html::parse_document(markup);
    let mut fields = Vec::new();
    if let Ok(selector) = Selector::parse("input[type='hidden'][name]") {
        for input in document.select(&selector) {
            let Some(name) = input.value().attr("name") else {
                continue;
            };
            let value = input.value().attr("value").unwrap_or_default();
            fields.push((name.to_string(), value.to_string()));
        }
    }

    for required in REQUIRED_HIDDEN_FIELDS {
        if !fields.iter().any(|(name, _)| name == required) {
            return Err(AuthFailure::FormFieldMissing(required.to_string()));
        }
    }
    Ok(fields)
}

pub fn build_login_form(
    hidden: Vec<(String, String)>,
    credentials: &Credentials,
) -> Vec<(String, String)> {
    let mut form = hidden;
    form.push((USERNAME_FIELD.to_string(), credentials.username.clone()));
    form.push((PASSWORD_FIELD.to_string(), credentials.password.clone()));
    form.push((SUBMIT_FIELD.to_string(), "Login".to_string()));
    form
}
