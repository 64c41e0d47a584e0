//! Renders the `GET /` status page: configured modules, stored cache
//! contents, and configured downloads.

use crate::state::AppState;

fn format_size(size: u64) -> String {
    if size >= 1024 * 1024 {
        format!("{:.2}\u{a0}MiB", size as f64 / (1024.0 * 1024.0))
    } else if size >= 1024 {
        format!("{:.2}\u{a0}kiB", size as f64 / 1024.0)
    } else {
        format!("{size}\u{a0}\u{a0}\u{a0}\u{a0}B\u{a0}\u{a0}")
    }
}

fn format_time(time: Option<std::time::SystemTime>) -> String {
    let Some(time) = time else {
        return String::new();
    };
    let secs = time
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    humanize_unix_timestamp(secs)
}

/// A dependency-free `YYYY-MM-DD HH:MM:SS` UTC formatter, avoiding a date/time
/// crate for one cosmetic field on an internal dashboard.
fn humanize_unix_timestamp(secs: u64) -> String {
    const SECS_PER_DAY: u64 = 86_400;
    let days_since_epoch = secs / SECS_PER_DAY;
    let time_of_day = secs % SECS_PER_DAY;

    let (hour, minute, second) = (time_of_day / 3600, (time_of_day / 60) % 60, time_of_day % 60);

    let mut year = 1970i64;
    let mut days = i64::try_from(days_since_epoch).unwrap_or(0);
    loop {
        let year_days = if is_leap_year(year) { 366 } else { 365 };
        if days < year_days {
            break;
        }
        days -= year_days;
        year += 1;
    }
    let month_lengths: [i64; 12] = if is_leap_year(year) {
        [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    } else {
        [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    };
    let mut month = 1;
    for len in month_lengths {
        if days < len {
            break;
        }
        days -= len;
        month += 1;
    }
    let day = days + 1;

    format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}")
}

const fn is_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Renders the full dashboard HTML page.
pub fn render(state: &AppState) -> String {
    let mut modules: Vec<_> = state.modules.keys().cloned().collect();
    modules.sort();

    let mut out = String::from(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>modcache</title></head><body>",
    );

    out.push_str("<h1>Configured modules</h1><table>");
    for name in &modules {
        let disabled = state.modules.get(name).and_then(Option::as_ref).is_none();
        let row_class = if disabled {
            "configured-module-disabled"
        } else {
            "configured-module-package"
        };
        out.push_str(&format!(
            "<tr class=\"{row_class}\"><td>{}</td><td>{}</td></tr>",
            escape_html(name),
            if disabled { "disabled" } else { "enabled" }
        ));
    }
    out.push_str("</table>");

    out.push_str("<h1>Stored modules</h1><table>");
    if let Ok(stored) = state.materializer.store().stored_modules() {
        for (i, module) in stored.iter().enumerate() {
            let zebra = if i % 2 == 0 { "even" } else { "odd" };
            out.push_str(&format!(
                "<tr class=\"{zebra}\"><td colspan=\"4\"><strong>{}</strong> (total {})</td></tr>",
                escape_html(&module.name),
                format_size(module.total_size)
            ));
            for version in &module.versions {
                if version.locked {
                    out.push_str(&format!(
                        "<tr><td></td><td>{}</td><td colspan=\"2\">locked</td></tr>",
                        escape_html(&version.version)
                    ));
                } else {
                    out.push_str(&format!(
                        "<tr><td></td><td>{}</td><td>{}</td><td>{}</td></tr>",
                        escape_html(&version.version),
                        format_size(version.size),
                        format_time(version.downloaded)
                    ));
                }
            }
        }
    }
    out.push_str("</table>");

    out.push_str("<h1>Configured downloads</h1><table>");
    let mut downloads: Vec<_> = state.downloads.keys().cloned().collect();
    downloads.sort();
    for name in &downloads {
        out.push_str(&format!("<tr><td>{}</td></tr>", escape_html(name)));
    }
    out.push_str("</table></body></html>");

    out
}
