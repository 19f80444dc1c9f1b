use anyhow::{Result, bail};
use mailprobe_lib::ValidationVerdict;

/// Rendu lisible d'un verdict, une information par ligne.
pub fn format_verdict(email: &str, verdict: &ValidationVerdict) -> String {
    let status = if verdict.is_valid() { "VALID" } else { "INVALID" };
    let mut lines = vec![
        format!("Email Validation Results for {email}:"),
        format!("Status: {status}"),
        format!("Has MX Records: {}", verdict.has_mx_records()),
        format!("Catch-All: {}", verdict.is_catch_all()),
    ];
    if !verdict.error_message().is_empty() {
        lines.push(format!("Details: {}", verdict.error_message()));
    }
    if let Some(endpoint) = verdict.endpoint() {
        lines.push(format!("Server: {endpoint}"));
    }
    lines.join("\n")
}

pub fn write_verdict(email: &str, verdict: &ValidationVerdict, format: &str) -> Result<()> {
    match format {
        "human" => {
            println!("{}", format_verdict(email, verdict));
            Ok(())
        }
        "json" => write_json(email, verdict),
        other => bail!("unknown --format '{other}', use: human|json"),
    }
}

#[cfg(feature = "with-serde")]
#[derive(serde::Serialize)]
struct VerdictReport<'a> {
    email: &'a str,
    #[serde(flatten)]
    verdict: &'a ValidationVerdict,
}

#[cfg(feature = "with-serde")]
fn write_json(email: &str, verdict: &ValidationVerdict) -> Result<()> {
    let report = VerdictReport { email, verdict };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(not(feature = "with-serde"))]
fn write_json(_: &str, _: &ValidationVerdict) -> Result<()> {
    bail!("format=json nécessite la feature 'with-serde'")
}

pub fn write_servers(servers: &[String]) {
    for server in servers {
        println!("{server}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailprobe_lib::SmtpEndpoint;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn human_rendering_of_rejected_address() {
        let endpoint = SmtpEndpoint {
            hostname: "mx1.example.com".to_string(),
            ip_address: IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10)),
            port: 25,
            implicit_tls: false,
        };
        let verdict = ValidationVerdict::rejected().with_endpoint(endpoint);
        insta::assert_snapshot!(format_verdict("ghost@example.com", &verdict), @r"
        Email Validation Results for ghost@example.com:
        Status: INVALID
        Has MX Records: true
        Catch-All: false
        Details: recipient does not exist.
        Server: mx1.example.com:25 (SMTP, 192.0.2.10)
        ");
    }

    #[test]
    fn human_rendering_of_catch_all_domain() {
        insta::assert_snapshot!(format_verdict("anyone@example.com", &ValidationVerdict::catch_all()), @r"
        Email Validation Results for anyone@example.com:
        Status: VALID
        Has MX Records: true
        Catch-All: true
        ");
    }

    #[test]
    fn human_rendering_of_expired_deadline() {
        let verdict = ValidationVerdict::timed_out(std::time::Duration::from_millis(1500));
        insta::assert_snapshot!(format_verdict("slow@example.com", &verdict), @r"
        Email Validation Results for slow@example.com:
        Status: INVALID
        Has MX Records: false
        Catch-All: false
        Details: validation timed out after 1500 ms (MX status unknown)
        ");
    }

    #[test]
    fn unknown_format_is_rejected() {
        let err = write_verdict("a@b.test", &ValidationVerdict::accepted(), "xml")
            .expect_err("xml is not supported");
        assert!(err.to_string().contains("human|json"));
    }
}
