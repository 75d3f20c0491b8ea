pub mod dispatch;
pub mod error;
pub mod localizer;
pub mod mail;
pub mod templates;
pub mod text;

pub use dispatch::{Dispatcher, Outgoing};
pub use error::{NotificationError, RenderError, Result};
pub use localizer::{DEFAULT_LANGUAGE, Localizer, language_of};
pub use mail::{
    Email, MailConfig, MailProvider, MailReceipt, Mailer, NullMailer, RecordingMailer, SesConfig,
    SmtpConfig, SmtpMailer, SmtpTls, build_mailer, encode_address,
};
pub use templates::{Rendered, Template, TemplateMeta, TemplateRegistry, Templates};
pub use text::{Values, html_escape};
