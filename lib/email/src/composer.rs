//! Recipient resolution and message composition.

use crate::error::ComposeError;
use crate::template::render;
use amber_relay_core::json::lookup_path;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The authored template for a send-email action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTemplateConfig {
    /// Subject line; may contain `{{ path }}` placeholders.
    pub subject: String,
    /// HTML body; may contain `{{ path }}` placeholders.
    pub content: String,
}

/// Where the recipients of a send-email action come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecipientSource {
    /// Team members, resolved to addresses through the directory service.
    TeamMember {
        /// Directory ids of the members.
        member_ids: Vec<String>,
    },
    /// An email address read off the target document itself.
    TargetAttribute {
        /// Dotted path to the address (e.g. `customer.primaryEmail`).
        path: String,
    },
    /// Fixed addresses entered by the automation author.
    Static {
        /// The addresses.
        emails: Vec<String>,
    },
}

/// The outcome of resolving recipient sources against a target.
///
/// Team-member ids cannot be resolved locally; the caller looks them up
/// through the directory service and merges the result before composing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientResolution {
    /// Addresses resolved locally (target attributes and static entries).
    pub emails: Vec<String>,
    /// Team-member ids still needing a directory lookup.
    pub team_member_ids: Vec<String>,
    /// Entries that were dropped as syntactically invalid.
    pub invalid: Vec<String>,
}

/// Resolves recipient sources against a target document.
///
/// Addresses are deduplicated; entries without an `@` are dropped into
/// `invalid` rather than silently discarded.
#[must_use]
pub fn resolve_recipients(
    sources: &[RecipientSource],
    target: &JsonValue,
) -> RecipientResolution {
    let mut resolution = RecipientResolution::default();

    for source in sources {
        match source {
            RecipientSource::TeamMember { member_ids } => {
                for id in member_ids {
                    if !resolution.team_member_ids.contains(id) {
                        resolution.team_member_ids.push(id.clone());
                    }
                }
            }
            RecipientSource::TargetAttribute { path } => {
                match lookup_path(target, path).and_then(JsonValue::as_str) {
                    Some(address) => push_email(&mut resolution, address),
                    None => resolution.invalid.push(format!("<{path}>")),
                }
            }
            RecipientSource::Static { emails } => {
                for address in emails {
                    push_email(&mut resolution, address);
                }
            }
        }
    }

    resolution
}

fn push_email(resolution: &mut RecipientResolution, address: &str) {
    let address = address.trim();
    if !address.contains('@') {
        resolution.invalid.push(address.to_string());
        return;
    }
    if !resolution.emails.iter().any(|e| e == address) {
        resolution.emails.push(address.to_string());
    }
}

/// A fully composed message, ready for a [`crate::Mailer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposedEmail {
    /// Recipient addresses.
    pub to: Vec<String>,
    /// Rendered subject.
    pub subject: String,
    /// Rendered HTML body.
    pub html_body: String,
    /// Optional plain-text alternative.
    pub text_body: Option<String>,
}

/// Composes a message from a template, a target document, and the final
/// recipient list.
///
/// # Errors
///
/// Returns [`ComposeError::NoRecipients`] when the recipient list is
/// empty: sending an email to nobody is an authoring error worth
/// surfacing on the execution, not a silent no-op.
pub fn compose(
    template: &EmailTemplateConfig,
    target: &JsonValue,
    recipients: Vec<String>,
) -> Result<ComposedEmail, ComposeError> {
    if recipients.is_empty() {
        return Err(ComposeError::NoRecipients);
    }

    let subject = render(&template.subject, target);
    let content = render(&template.content, target);

    if !subject.is_complete() || !content.is_complete() {
        tracing::warn!(
            missing = ?subject
                .missing_paths
                .iter()
                .chain(&content.missing_paths)
                .collect::<Vec<_>>(),
            "email template placeholders did not resolve"
        );
    }

    Ok(ComposedEmail {
        to: recipients,
        subject: subject.text,
        html_body: content.text,
        text_body: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ticket() -> JsonValue {
        json!({
            "number": 7,
            "subject": "Printer on fire",
            "customer": {"primaryEmail": "dana@example.com", "firstName": "Dana"}
        })
    }

    #[test]
    fn resolves_target_attribute_and_static_sources() {
        let sources = vec![
            RecipientSource::TargetAttribute {
                path: "customer.primaryEmail".to_string(),
            },
            RecipientSource::Static {
                emails: vec!["support@example.com".to_string()],
            },
        ];

        let resolution = resolve_recipients(&sources, &ticket());
        assert_eq!(
            resolution.emails,
            vec!["dana@example.com", "support@example.com"]
        );
        assert!(resolution.team_member_ids.is_empty());
        assert!(resolution.invalid.is_empty());
    }

    #[test]
    fn team_member_ids_pass_through_for_directory_lookup() {
        let sources = vec![RecipientSource::TeamMember {
            member_ids: vec!["u1".to_string(), "u2".to_string(), "u1".to_string()],
        }];

        let resolution = resolve_recipients(&sources, &ticket());
        assert_eq!(resolution.team_member_ids, vec!["u1", "u2"]);
    }

    #[test]
    fn duplicate_and_invalid_addresses() {
        let sources = vec![RecipientSource::Static {
            emails: vec![
                "dana@example.com".to_string(),
                "dana@example.com".to_string(),
                "not-an-address".to_string(),
            ],
        }];

        let resolution = resolve_recipients(&sources, &ticket());
        assert_eq!(resolution.emails, vec!["dana@example.com"]);
        assert_eq!(resolution.invalid, vec!["not-an-address"]);
    }

    #[test]
    fn missing_target_attribute_is_invalid() {
        let sources = vec![RecipientSource::TargetAttribute {
            path: "customer.secondaryEmail".to_string(),
        }];

        let resolution = resolve_recipients(&sources, &ticket());
        assert!(resolution.emails.is_empty());
        assert_eq!(resolution.invalid, vec!["<customer.secondaryEmail>"]);
    }

    #[test]
    fn composes_rendered_message() {
        let template = EmailTemplateConfig {
            subject: "Ticket #{{number}}: {{subject}}".to_string(),
            content: "<p>Hi {{customer.firstName}},</p>".to_string(),
        };

        let email = compose(&template, &ticket(), vec!["dana@example.com".to_string()])
            .expect("compose");

        assert_eq!(email.subject, "Ticket #7: Printer on fire");
        assert_eq!(email.html_body, "<p>Hi Dana,</p>");
        assert_eq!(email.to, vec!["dana@example.com"]);
    }

    #[test]
    fn compose_rejects_empty_recipients() {
        let template = EmailTemplateConfig {
            subject: "s".to_string(),
            content: "c".to_string(),
        };

        let result = compose(&template, &ticket(), Vec::new());
        assert!(matches!(result, Err(ComposeError::NoRecipients)));
    }

    #[test]
    fn recipient_source_serde_roundtrip() {
        let source = RecipientSource::TargetAttribute {
            path: "customer.primaryEmail".to_string(),
        };
        let encoded = serde_json::to_string(&source).expect("serialize");
        let parsed: RecipientSource = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(source, parsed);
    }
}
