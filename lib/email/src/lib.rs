//! Email composition and dispatch for the amber-relay automation engine.
//!
//! The send-email action is composed in three steps:
//!
//! 1. **Render**: substitute `{{ path }}` placeholders in the subject and
//!    body against the target document
//! 2. **Resolve**: turn recipient sources (team members, target
//!    attributes, static addresses) into concrete addresses
//! 3. **Send**: dispatch over SMTP via the [`Mailer`] trait

pub mod composer;
pub mod error;
pub mod mailer;
pub mod template;

pub use composer::{
    ComposedEmail, EmailTemplateConfig, RecipientResolution, RecipientSource, compose,
    resolve_recipients,
};
pub use error::ComposeError;
pub use mailer::{Mailer, MailerError, RecordingMailer, SmtpConfig, SmtpMailer};
pub use template::{RenderedTemplate, render};
