use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use mailprobe_lib::{Validator, ValidationVerdict};
use tracing::info;

pub const RESULT_COLUMN: &str = "is_valid_email";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BulkSummary {
    pub valid: usize,
    pub invalid: usize,
    pub skipped: usize,
}

impl BulkSummary {
    pub fn processed(&self) -> usize {
        self.valid + self.invalid
    }
}

/// Valide le fichier `input` et écrit le résultat dans `out` (ou à la place
/// de l'entrée). Renvoie `true` si toutes les adresses sont valides.
pub fn run(validator: &Validator, input: &Path, out: Option<&Path>) -> Result<bool> {
    let file = std::fs::File::open(input).with_context(|| format!("open {}", input.display()))?;
    println!("Starting email validation of {}", input.display());

    let mut buffer = Vec::new();
    let summary = process(file, &mut buffer, |row, email| {
        print!("Validating email {row}: {email}... ");
        io::stdout().flush().ok();
        let verdict = validator.validate(email);
        if verdict.is_valid() {
            println!("VALID");
        } else {
            println!("INVALID ({})", verdict.error_message());
        }
        verdict
    })?;

    let target = out.unwrap_or(input);
    write_all_atomically(target, &buffer)?;

    println!();
    println!("=== Email Validation Summary ===");
    println!("Total emails processed: {}", summary.processed());
    println!("Valid emails: {}", summary.valid);
    println!("Invalid emails: {}", summary.invalid);
    if summary.skipped > 0 {
        println!("Rows without email: {}", summary.skipped);
    }
    println!("Results have been written to: {}", target.display());
    Ok(summary.invalid == 0)
}

/// Recopie le CSV en ajoutant la colonne [`RESULT_COLUMN`]. Les lignes sans
/// adresse gardent une cellule vide et ne sont pas validées.
pub fn process<R, W, F>(reader: R, writer: W, mut check: F) -> Result<BulkSummary>
where
    R: io::Read,
    W: io::Write,
    F: FnMut(usize, &str) -> ValidationVerdict,
{
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(writer);

    let headers = rdr.headers().context("read CSV header")?.clone();
    let Some(email_column) = headers.iter().position(|name| normalize_header(name) == "email") else {
        bail!("no 'email' column in CSV header");
    };

    let mut out_headers = headers.clone();
    out_headers.push_field(RESULT_COLUMN);
    wtr.write_record(&out_headers)?;

    let mut summary = BulkSummary::default();
    for (index, record) in rdr.records().enumerate() {
        let mut record = record.with_context(|| format!("read CSV row {}", index + 1))?;
        let email = record.get(email_column).map(str::trim).unwrap_or_default().to_string();
        if email.is_empty() {
            summary.skipped += 1;
            record.push_field("");
        } else {
            let verdict = check(index + 1, &email);
            if verdict.is_valid() {
                summary.valid += 1;
            } else {
                summary.invalid += 1;
            }
            record.push_field(if verdict.is_valid() { "true" } else { "false" });
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    info!(
        valid = summary.valid,
        invalid = summary.invalid,
        skipped = summary.skipped,
        "bulk validation finished"
    );
    Ok(summary)
}

fn normalize_header(name: &str) -> String {
    name.trim().replace(' ', "_").to_lowercase()
}

fn write_all_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}
