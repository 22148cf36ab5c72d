use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};

const KST_OFFSET_SECS: i32 = 9 * 3600;

// Runs before this hour (KST) publish the morning slot, which covers the
// previous US close; later runs publish the afternoon follow-up.
const AFTERNOON_CUTOFF_HOUR_KST: u32 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Session {
    Morning,
    Afternoon,
}

impl Session {
    pub fn label(&self) -> &'static str {
        match self {
            Session::Morning => "morning",
            Session::Afternoon => "afternoon",
        }
    }

    pub fn slot_code(&self) -> &'static str {
        match self {
            Session::Morning => "am",
            Session::Afternoon => "pm",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "morning" | "am" => Some(Session::Morning),
            "afternoon" | "pm" => Some(Session::Afternoon),
            _ => None,
        }
    }
}

/// Short slot code used in archive filenames. Unknown free-text session
/// labels degrade to a sanitized lowercase prefix so the name stays
/// deterministic and filesystem-safe.
pub fn slot_code_for(label: &str) -> String {
    if let Some(session) = Session::from_label(label) {
        return session.slot_code().to_string();
    }
    let sanitized: String = label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .take(8)
        .collect();
    if sanitized.is_empty() {
        "xx".to_string()
    } else {
        sanitized
    }
}

/// Resolve the analysis date and session slot for a run. The publication is
/// KST-scheduled commentary on the US session: a KST morning run covers the
/// US close of the previous calendar day, rolled back over weekends.
pub fn resolve_run_slot(
    as_of_date_arg: Option<&str>,
    session_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<(NaiveDate, Session)> {
    let kst = chrono::FixedOffset::east_opt(KST_OFFSET_SECS).context("invalid KST offset")?;
    let now_kst = now_utc.with_timezone(&kst);

    let session = match session_arg {
        Some(label) => Session::from_label(label)
            .with_context(|| format!("unknown session label '{label}' (expected morning|afternoon)"))?,
        None => {
            if now_kst.hour() < AFTERNOON_CUTOFF_HOUR_KST {
                Session::Morning
            } else {
                Session::Afternoon
            }
        }
    };

    if let Some(s) = as_of_date_arg {
        let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid --as-of-date '{s}'"))?;
        return Ok((date, session));
    }

    // The US close being commented on happened on the previous calendar day
    // in KST terms.
    let mut date = now_kst.date_naive() - Duration::days(1);
    while is_weekend(date) {
        date -= Duration::days(1);
    }

    Ok((date, session))
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}
