//! Attribute-tagged XML rules of list-based backends.
//!
//! ```xml
//! <recurrence>
//!   <rule>
//!     <firstDayOfWeek>su</firstDayOfWeek>
//!     <repeat><monthlyByDay tu="TRUE" weekdayOfMonth="third" monthFrequency="1"/></repeat>
//!     <repeatInstances>10</repeatInstances>
//!   </rule>
//! </recurrence>
//! ```
//!
//! The element inside `<repeat>` selects the pattern, its attributes carry
//! the interval and day selection. `<repeatInstances>`, `<windowEnd>` and
//! `<repeatForever>` terminate the series.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use calmux_core::{RecurrenceKind, RecurrencePattern};

use super::{end_of_day, week_of_month};
use crate::error::NormalizationError;

/// Day flag attributes in Sunday-first order.
const DAY_FLAGS: [&str; 7] = ["su", "mo", "tu", "we", "th", "fr", "sa"];

#[derive(Debug, Clone, Copy)]
enum Terminator {
    Instances,
    WindowEnd,
    Forever,
}

/// Parses a list-based rule document.
pub(super) fn parse(xml: &str) -> Result<RecurrencePattern, NormalizationError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut pattern: Option<RecurrencePattern> = None;
    let mut repeat_instances: Option<u32> = None;
    let mut window_end: Option<DateTime<Utc>> = None;
    let mut current: Option<Terminator> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                current = match local_name(&name) {
                    "repeatInstances" => Some(Terminator::Instances),
                    "windowEnd" => Some(Terminator::WindowEnd),
                    "repeatForever" => Some(Terminator::Forever),
                    other => {
                        if pattern.is_none() {
                            pattern = repeat_element(other, &e)?;
                        }
                        None
                    }
                };
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if pattern.is_none() {
                    pattern = repeat_element(local_name(&name), &e)?;
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(field) = current {
                    let text = e
                        .unescape()
                        .map_err(|err| NormalizationError::MalformedXml(err.to_string()))?
                        .to_string();
                    match field {
                        Terminator::Instances => {
                            let count = text
                                .parse::<u32>()
                                .map_err(|_| NormalizationError::invalid("repeatInstances", &text))?;
                            repeat_instances = Some(count);
                        }
                        Terminator::WindowEnd => window_end = Some(parse_window_end(&text)?),
                        // Absence of the other terminators already means unbounded.
                        Terminator::Forever => {}
                    }
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(NormalizationError::MalformedXml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    let mut pattern = pattern
        .ok_or_else(|| NormalizationError::UnknownPattern("no repeat element".to_string()))?;
    pattern.occurrence_count = repeat_instances;
    pattern.end_date = window_end;
    Ok(pattern)
}

/// Builds a pattern from a `<repeat>` child, or `None` for other elements.
fn repeat_element(
    local: &str,
    e: &BytesStart<'_>,
) -> Result<Option<RecurrencePattern>, NormalizationError> {
    let pattern = match local {
        "daily" => {
            let attrs = attributes(e)?;
            if flag(&attrs, "weekday") {
                RecurrencePattern::weekdays()
            } else {
                RecurrencePattern::daily(frequency(&attrs, "dayFrequency")?)
            }
        }
        "weekly" => {
            let attrs = attributes(e)?;
            RecurrencePattern::weekly(frequency(&attrs, "weekFrequency")?, day_flags(&attrs))
        }
        "monthly" => {
            let attrs = attributes(e)?;
            RecurrencePattern::monthly_on_day(
                frequency(&attrs, "monthFrequency")?,
                number(&attrs, "day")?,
            )
        }
        "monthlyByDay" => {
            let attrs = attributes(e)?;
            RecurrencePattern::monthly_on_weekday(
                frequency(&attrs, "monthFrequency")?,
                ordinal(&attrs)?,
                by_day_selection(&attrs)?,
            )
        }
        "yearly" => {
            let attrs = attributes(e)?;
            RecurrencePattern::yearly_on(
                frequency(&attrs, "yearFrequency")?,
                number(&attrs, "month")?,
                number(&attrs, "day")?,
            )
        }
        "yearlyByDay" => {
            let attrs = attributes(e)?;
            let mut pattern = RecurrencePattern::monthly_on_weekday(
                frequency(&attrs, "yearFrequency")?,
                ordinal(&attrs)?,
                by_day_selection(&attrs)?,
            )
            .with_month(number(&attrs, "month")?);
            pattern.kind = RecurrenceKind::Yearly;
            pattern
        }
        _ => return Ok(None),
    };
    Ok(Some(pattern))
}

fn attributes(e: &BytesStart<'_>) -> Result<HashMap<String, String>, NormalizationError> {
    let mut out = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| NormalizationError::MalformedXml(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| NormalizationError::MalformedXml(err.to_string()))?
            .to_string();
        out.insert(local_name(&key).to_string(), value);
    }
    Ok(out)
}

fn flag(attrs: &HashMap<String, String>, name: &str) -> bool {
    attrs
        .get(name)
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

/// Reads an interval attribute; a missing one means every period.
fn frequency(attrs: &HashMap<String, String>, name: &'static str) -> Result<u32, NormalizationError> {
    match attrs.get(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| NormalizationError::invalid(name, value)),
        None => Ok(1),
    }
}

fn number(attrs: &HashMap<String, String>, name: &'static str) -> Result<u32, NormalizationError> {
    let value = attrs
        .get(name)
        .ok_or_else(|| NormalizationError::invalid(name, ""))?;
    value
        .trim()
        .parse()
        .map_err(|_| NormalizationError::invalid(name, value))
}

fn ordinal(attrs: &HashMap<String, String>) -> Result<i8, NormalizationError> {
    let value = attrs
        .get("weekdayOfMonth")
        .ok_or_else(|| NormalizationError::invalid("weekdayOfMonth", ""))?;
    week_of_month(value)
}

fn day_flags(attrs: &HashMap<String, String>) -> BTreeSet<u8> {
    (0u8..)
        .zip(DAY_FLAGS)
        .filter(|(_, name)| flag(attrs, name))
        .map(|(index, _)| index)
        .collect()
}

/// Day selection of the `...ByDay` forms.
///
/// Besides the per-day flags these accept `day` (any day), `weekday`
/// (Monday to Friday) and `weekend_day` (Saturday or Sunday).
fn by_day_selection(attrs: &HashMap<String, String>) -> Result<BTreeSet<u8>, NormalizationError> {
    let mut days = day_flags(attrs);
    if flag(attrs, "day") {
        days.extend(0..=6);
    }
    if flag(attrs, "weekday") {
        days.extend(1..=5);
    }
    if flag(attrs, "weekend_day") {
        days.extend([0, 6]);
    }
    if days.is_empty() {
        return Err(NormalizationError::invalid("day selection", ""));
    }
    Ok(days)
}

/// `windowEnd` names the last day of the series, inclusive.
fn parse_window_end(text: &str) -> Result<DateTime<Utc>, NormalizationError> {
    let text = text.trim();
    let date = DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y-%m-%d"))
        .map_err(|_| NormalizationError::invalid("windowEnd", text))?;
    Ok(end_of_day(date))
}

fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}
