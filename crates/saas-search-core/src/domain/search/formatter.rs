//! Result title/description formatting
//!
//! Each entity type may carry its own `ResultFormatter`. Types registered
//! without one fall back to `GenericFormatter`, so custom entities get
//! sensible titles without touching the engine.

use super::entity::{Row, field_text};

/// Builds the title and description shown for a result row
pub trait ResultFormatter: Send + Sync {
    /// Return `(title, description)` for a row of the given entity type
    fn title_description(&self, entity_type: &str, row: &Row) -> (String, String);
}

impl<F> ResultFormatter for F
where
    F: Fn(&str, &Row) -> (String, String) + Send + Sync,
{
    fn title_description(&self, entity_type: &str, row: &Row) -> (String, String) {
        self(entity_type, row)
    }
}

/// Fallback: `name`, then `title`, then `"{type} #{id}"`
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericFormatter;

impl ResultFormatter for GenericFormatter {
    fn title_description(&self, entity_type: &str, row: &Row) -> (String, String) {
        for key in ["name", "title"] {
            let value = field_text(row, key);
            if !value.is_empty() {
                return (value, format!("{} record", entity_type));
            }
        }
        (
            format!("{} #{}", entity_type, field_text(row, "id")),
            String::new(),
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UserFormatter;

impl ResultFormatter for UserFormatter {
    fn title_description(&self, _entity_type: &str, row: &Row) -> (String, String) {
        let title = format!(
            "{} {}",
            field_text(row, "first_name"),
            field_text(row, "last_name")
        );
        (
            title.trim().to_string(),
            format!("Email: {}", field_text(row, "email")),
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CustomerFormatter;

impl ResultFormatter for CustomerFormatter {
    fn title_description(&self, _entity_type: &str, row: &Row) -> (String, String) {
        let mut description = format!("Email: {}", field_text(row, "email"));
        let company = field_text(row, "company");
        if !company.is_empty() {
            description.push_str(&format!(" | Company: {}", company));
        }
        (field_text(row, "name"), description)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContactFormatter;

impl ResultFormatter for ContactFormatter {
    fn title_description(&self, _entity_type: &str, row: &Row) -> (String, String) {
        (
            field_text(row, "name"),
            format!("Subject: {}", field_text(row, "subject")),
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanFormatter;

impl ResultFormatter for PlanFormatter {
    fn title_description(&self, _entity_type: &str, row: &Row) -> (String, String) {
        (
            field_text(row, "name"),
            format!(
                "Price: {} {}",
                field_text(row, "price"),
                field_text(row, "currency")
            ),
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EmailFormatter;

impl ResultFormatter for EmailFormatter {
    fn title_description(&self, _entity_type: &str, row: &Row) -> (String, String) {
        (
            field_text(row, "subject"),
            format!(
                "To: {} | Status: {}",
                field_text(row, "to_email"),
                field_text(row, "status")
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_generic_formatter_fallback_chain() {
        let f = GenericFormatter;
        assert_eq!(
            f.title_description("widgets", &row(json!({"id": 1, "name": "Sprocket"}))),
            ("Sprocket".to_string(), "widgets record".to_string())
        );
        assert_eq!(
            f.title_description("widgets", &row(json!({"id": 1, "title": "Blue Widget"}))),
            ("Blue Widget".to_string(), "widgets record".to_string())
        );
        assert_eq!(
            f.title_description("widgets", &row(json!({"id": 7}))),
            ("widgets #7".to_string(), String::new())
        );
    }

    #[test]
    fn test_user_formatter_trims_missing_last_name() {
        let (title, description) = UserFormatter.title_description(
            "users",
            &row(json!({"first_name": "Ada", "last_name": null, "email": "ada@example.com"})),
        );
        assert_eq!(title, "Ada");
        assert_eq!(description, "Email: ada@example.com");
    }

    #[test]
    fn test_customer_formatter_company_optional() {
        let (_, with_company) = CustomerFormatter.title_description(
            "customers",
            &row(json!({"name": "Acme", "email": "hi@acme.test", "company": "Acme Corp"})),
        );
        assert_eq!(with_company, "Email: hi@acme.test | Company: Acme Corp");

        let (_, without) = CustomerFormatter.title_description(
            "customers",
            &row(json!({"name": "Acme", "email": "hi@acme.test"})),
        );
        assert_eq!(without, "Email: hi@acme.test");
    }

    #[test]
    fn test_email_and_plan_formatters() {
        let (title, description) = EmailFormatter.title_description(
            "emails",
            &row(json!({"subject": "Invoice", "to_email": "a@b.c", "status": "sent"})),
        );
        assert_eq!(title, "Invoice");
        assert_eq!(description, "To: a@b.c | Status: sent");

        let (title, description) = PlanFormatter.title_description(
            "plans",
            &row(json!({"name": "Pro", "price": 29, "currency": "EUR"})),
        );
        assert_eq!(title, "Pro");
        assert_eq!(description, "Price: 29 EUR");
    }

    #[test]
    fn test_closure_formatter() {
        let f = |entity_type: &str, row: &Row| {
            (
                format!("{}:{}", entity_type, field_text(row, "sku")),
                String::new(),
            )
        };
        let (title, _) = f.title_description("parts", &row(json!({"sku": "X-1"})));
        assert_eq!(title, "parts:X-1");
    }
}
