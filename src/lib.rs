#![forbid(unsafe_code)]
//! mailprobe_lib : vérifie la délivrabilité d'une adresse e-mail sans envoyer de message
//! (MX lookup, négociation SMTP jusqu'à `RCPT TO`, classification de la réponse).

pub mod address;
pub use address::{Address, extract_domain, split_address};

pub mod mx;
pub use mx::{MxError, MxRecord, lookup_mail_exchangers};

pub mod smtp_verify;
pub use smtp_verify::{
    HandshakeStage, ProbeConfig, ProbeError, RecipientOutcome, SmtpEndpoint, SmtpReply,
    ValidationVerdict, Validator, check_mailaddress_exists, classify,
};
