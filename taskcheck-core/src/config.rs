//! Run configuration: working hours, named time maps, exceptions and calendar sources.
//!
//! The file lives at `<config dir>/task/taskcheck.toml` and is loaded through the
//! `config` crate, so any key can be overridden with a `TASKCHECK__<SECTION>__<KEY>`
//! environment variable. The raw file is validated once into [`Settings`], which the
//! rest of the engine treats as immutable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime, Weekday};
use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{TaskcheckError, TaskcheckResult};
use crate::working_hours::{Exceptions, TimeWindow, WorkingHoursTemplate};

const CONFIG_FILE: &str = "taskcheck.toml";
const DEFAULT_DAYS_AHEAD: u32 = 7;
const DEFAULT_FRESHNESS: &str = "15m";
/// Longest lookahead accepted for the scheduler or any calendar.
pub const MAX_DAYS_AHEAD: u32 = 3650;

fn default_days_ahead() -> u32 {
    DEFAULT_DAYS_AHEAD
}

fn default_freshness() -> Expiration {
    Expiration::Text(DEFAULT_FRESHNESS.to_string())
}

/// A time of day as written in the config file.
///
/// Either `"09:30"` or the decimal form `9.30`, where the two fractional digits
/// are minutes rather than a fraction of an hour.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ClockValue {
    Text(String),
    Decimal(f64),
}

impl ClockValue {
    pub fn to_time(&self) -> TaskcheckResult<NaiveTime> {
        match self {
            ClockValue::Text(s) => NaiveTime::parse_from_str(s, "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
                .map_err(|_| TaskcheckError::Config(format!("invalid time of day '{s}'"))),
            ClockValue::Decimal(value) => {
                let hours = value.trunc();
                let minutes = ((value - hours) * 100.0).round();
                if !(0.0..24.0).contains(&hours) || !(0.0..60.0).contains(&minutes) {
                    return Err(TaskcheckError::Config(format!(
                        "invalid time of day '{value}'"
                    )));
                }
                NaiveTime::from_hms_opt(hours as u32, minutes as u32, 0)
                    .ok_or_else(|| TaskcheckError::Config(format!("invalid time of day '{value}'")))
            }
        }
    }
}

/// `[start, end]` pair as written in the config file.
pub type RawWindow = (ClockValue, ClockValue);

/// Windows per weekday name, as written in the config file.
pub type RawWeek = BTreeMap<String, Vec<RawWindow>>;

/// How long a fetched feed stays fresh.
///
/// Either a humantime string (`"15m"`, `"1h 30m"`) or a number of hours (`0.25`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Expiration {
    Text(String),
    Hours(f64),
}

impl Expiration {
    pub fn to_duration(&self) -> TaskcheckResult<Duration> {
        match self {
            Expiration::Text(s) => humantime::parse_duration(s)
                .map_err(|e| TaskcheckError::Config(format!("invalid expiration '{s}': {e}"))),
            Expiration::Hours(hours) => Duration::try_from_secs_f64(hours * 3600.0)
                .map_err(|_| TaskcheckError::Config(format!("invalid expiration '{hours}'"))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    #[serde(default = "default_days_ahead")]
    pub days_ahead: u32,

    /// Treat any calendar failure as fatal instead of skipping that calendar.
    #[serde(default)]
    pub strict: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            days_ahead: DEFAULT_DAYS_AHEAD,
            strict: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalendarConfig {
    pub url: String,

    #[serde(default = "default_freshness")]
    pub expiration: Expiration,

    /// Zone for this feed's floating times and all-day dates.
    pub timezone: Option<String>,

    #[serde(default)]
    pub event_all_day_is_blocking: bool,

    /// Lookahead for this calendar; defaults to `scheduler.days_ahead`.
    pub days_ahead: Option<u32>,
}

/// The config file as written on disk.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub timezone: Option<String>,

    pub cache_dir: Option<String>,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub working_hours: RawWeek,

    /// Named weekly patterns; a task may be limited to some of them.
    #[serde(default)]
    pub time_maps: BTreeMap<String, RawWeek>,

    #[serde(default)]
    pub exceptions: BTreeMap<String, Vec<RawWindow>>,

    #[serde(default)]
    pub calendars: BTreeMap<String, CalendarConfig>,
}

/// An external calendar feed to block time from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarSource {
    pub name: String,
    pub url: String,
    pub freshness: Duration,
    pub days_ahead: u32,
    pub include_all_day: bool,
    /// Overrides the run zone for this feed.
    pub timezone: Option<Tz>,
}

/// Validated, immutable configuration for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub timezone: Option<Tz>,
    pub cache_dir: Option<PathBuf>,
    pub days_ahead: u32,
    pub strict: bool,
    /// All working time: `working_hours` joined with every time map.
    pub template: WorkingHoursTemplate,
    pub time_maps: BTreeMap<String, WorkingHoursTemplate>,
    pub exceptions: Exceptions,
    pub sources: Vec<CalendarSource>,
}

/// Default location of the config file.
pub fn default_config_path() -> TaskcheckResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| TaskcheckError::Config("Could not determine config directory".into()))?
        .join("task");

    Ok(config_dir.join(CONFIG_FILE))
}

impl RawConfig {
    /// Load the file at `path`, layering `TASKCHECK__*` environment overrides on top.
    pub fn load(path: &Path) -> TaskcheckResult<Self> {
        if !path.exists() {
            return Err(TaskcheckError::Config(format!(
                "config file not found at {}",
                path.display()
            )));
        }

        Config::builder()
            .add_source(File::from(path.to_path_buf()))
            .add_source(Environment::with_prefix("TASKCHECK").separator("__"))
            .build()
            .map_err(|e| TaskcheckError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| TaskcheckError::Config(e.to_string()))
    }

    /// Parse config from TOML text (no environment overrides).
    pub fn from_toml(content: &str) -> TaskcheckResult<Self> {
        Config::builder()
            .add_source(File::from_str(content, config::FileFormat::Toml))
            .build()
            .map_err(|e| TaskcheckError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| TaskcheckError::Config(e.to_string()))
    }

    pub fn validate(self) -> TaskcheckResult<Settings> {
        let timezone = self.timezone.as_deref().map(parse_tz).transpose()?;

        let cache_dir = self
            .cache_dir
            .as_deref()
            .map(|dir| PathBuf::from(shellexpand::tilde(dir).into_owned()));

        check_days_ahead("scheduler.days_ahead", self.scheduler.days_ahead)?;

        let mut template = to_template(&self.working_hours)?;
        let mut time_maps = BTreeMap::new();
        for (name, week) in &self.time_maps {
            let map = to_template(week).map_err(|e| match e {
                TaskcheckError::Config(msg) => TaskcheckError::Config(format!("time map '{name}': {msg}")),
                other => other,
            })?;
            template = template.union(&map);
            time_maps.insert(name.clone(), map);
        }
        if template.is_empty() {
            return Err(TaskcheckError::Config(
                "no working hours configured; add [working_hours] or [time_maps.<name>]".into(),
            ));
        }

        let mut exceptions = Exceptions::new();
        for (date, windows) in &self.exceptions {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
                TaskcheckError::Config(format!("invalid exception date '{date}', expected YYYY-MM-DD"))
            })?;
            exceptions.insert(date, to_windows(windows)?)?;
        }

        let mut sources = Vec::with_capacity(self.calendars.len());
        for (name, calendar) in self.calendars {
            if calendar.url.trim().is_empty() {
                return Err(TaskcheckError::Config(format!("calendar '{name}' has no url")));
            }
            let freshness = calendar
                .expiration
                .to_duration()
                .map_err(|e| TaskcheckError::Config(format!("calendar '{name}': {e}")))?;
            let days_ahead = calendar.days_ahead.unwrap_or(self.scheduler.days_ahead);
            check_days_ahead(&format!("calendar '{name}' days_ahead"), days_ahead)?;
            let timezone = calendar.timezone.as_deref().map(parse_tz).transpose()?;
            sources.push(CalendarSource {
                name,
                url: calendar.url,
                freshness,
                days_ahead,
                include_all_day: calendar.event_all_day_is_blocking,
                timezone,
            });
        }

        Ok(Settings {
            timezone,
            cache_dir,
            days_ahead: self.scheduler.days_ahead,
            strict: self.scheduler.strict,
            template,
            time_maps,
            exceptions,
            sources,
        })
    }
}

fn parse_tz(name: &str) -> TaskcheckResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| TaskcheckError::Config(format!("unknown timezone '{name}'")))
}

fn check_days_ahead(key: &str, days: u32) -> TaskcheckResult<()> {
    if !(1..=MAX_DAYS_AHEAD).contains(&days) {
        return Err(TaskcheckError::Config(format!(
            "{key} must be between 1 and {MAX_DAYS_AHEAD}, got {days}"
        )));
    }
    Ok(())
}

fn to_template(week: &RawWeek) -> TaskcheckResult<WorkingHoursTemplate> {
    let mut template = WorkingHoursTemplate::new();
    for (day, windows) in week {
        let weekday = day
            .parse::<Weekday>()
            .map_err(|_| TaskcheckError::Config(format!("unknown weekday '{day}'")))?;
        template.set(weekday, to_windows(windows)?)?;
    }
    Ok(template)
}

fn to_windows(raw: &[RawWindow]) -> TaskcheckResult<Vec<TimeWindow>> {
    raw.iter()
        .map(|(start, end)| TimeWindow::new(start.to_time()?, end.to_time()?))
        .collect()
}

impl Settings {
    /// Load and validate the config file at `path`.
    pub fn load(path: &Path) -> TaskcheckResult<Self> {
        RawConfig::load(path)?.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
timezone = "Europe/Rome"

[scheduler]
days_ahead = 14

[working_hours]
monday = [["09:00", "12:30"], ["13:30", "17:00"]]
tuesday = [[9.0, 12.30]]
saturday = []

[exceptions]
"2026-12-25" = []
"2026-10-23" = [["10:00", "12:00"]]

[calendars.work]
url = "https://example.com/work.ics"
expiration = "30m"
event_all_day_is_blocking = true

[calendars.holidays]
url = "https://example.com/holidays.ics"
days_ahead = 30
"#;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn parses_and_validates_sample() {
        let settings = RawConfig::from_toml(SAMPLE).unwrap().validate().unwrap();

        assert_eq!(settings.timezone, Some(chrono_tz::Europe::Rome));
        assert_eq!(settings.days_ahead, 14);
        assert!(!settings.strict);

        let monday = settings.template.windows(Weekday::Mon);
        assert_eq!(monday.len(), 2);
        assert_eq!(monday[1].start, hm(13, 30));

        let tuesday = settings.template.windows(Weekday::Tue);
        assert_eq!(tuesday[0].end, hm(12, 30));

        let christmas = NaiveDate::from_ymd_opt(2026, 12, 25).unwrap();
        assert_eq!(settings.exceptions.get(christmas), Some(&[][..]));

        assert_eq!(settings.sources.len(), 2);
        let holidays = settings.sources.iter().find(|s| s.name == "holidays").unwrap();
        assert_eq!(holidays.days_ahead, 30);
        assert_eq!(holidays.freshness, Duration::from_secs(15 * 60));
        assert!(!holidays.include_all_day);

        let work = settings.sources.iter().find(|s| s.name == "work").unwrap();
        assert_eq!(work.days_ahead, 14);
        assert_eq!(work.freshness, Duration::from_secs(30 * 60));
        assert!(work.include_all_day);
    }

    #[test]
    fn decimal_clock_values_use_minutes() {
        assert_eq!(ClockValue::Decimal(9.45).to_time().unwrap(), hm(9, 45));
        assert_eq!(ClockValue::Decimal(17.0).to_time().unwrap(), hm(17, 0));
        assert!(ClockValue::Decimal(9.75).to_time().is_err());
        assert!(ClockValue::Decimal(25.0).to_time().is_err());
    }

    const NINE_TO_FIVE: &str = "[working_hours]\nmonday = [[\"09:00\", \"17:00\"]]\n";

    #[test]
    fn unknown_weekday_is_config_error() {
        let raw = RawConfig::from_toml("[working_hours]\nfunday = [[\"09:00\", \"10:00\"]]\n").unwrap();
        assert!(matches!(raw.validate(), Err(TaskcheckError::Config(_))));
    }

    #[test]
    fn missing_working_hours_is_config_error() {
        let raw = RawConfig::from_toml("[scheduler]\ndays_ahead = 7\n").unwrap();
        let err = raw.validate().unwrap_err();
        assert!(matches!(err, TaskcheckError::Config(ref msg) if msg.contains("no working hours")));

        let raw = RawConfig::from_toml("[working_hours]\nmonday = []\n").unwrap();
        assert!(matches!(raw.validate(), Err(TaskcheckError::Config(_))));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(RawConfig::from_toml("[schedule]\ndays_ahead = 7\n").is_err());
        assert!(
            RawConfig::from_toml(
                "[calendars.work]\nurl = \"https://example.com/a.ics\"\nexpires = \"1h\"\n"
            )
            .is_err()
        );
    }

    #[test]
    fn time_maps_join_the_working_template() {
        let raw = RawConfig::from_toml(
            r#"
[time_maps.work]
monday = [[9, 12.30], [14, 17]]

[time_maps.evening]
monday = [[16, 19]]
sunday = [["10:00", "11:00"]]
"#,
        )
        .unwrap();
        let settings = raw.validate().unwrap();

        assert_eq!(settings.time_maps.len(), 2);
        assert_eq!(settings.time_maps["work"].windows(Weekday::Mon).len(), 2);
        let monday = settings.template.windows(Weekday::Mon);
        assert_eq!(monday.len(), 2);
        assert_eq!((monday[0].start, monday[0].end), (hm(9, 0), hm(12, 30)));
        assert_eq!((monday[1].start, monday[1].end), (hm(14, 0), hm(19, 0)));
        assert_eq!(settings.template.windows(Weekday::Sun).len(), 1);
    }

    #[test]
    fn numeric_expiration_is_hours() {
        let raw = RawConfig::from_toml(&format!(
            "{NINE_TO_FIVE}[calendars.work]\nurl = \"https://example.com/a.ics\"\nexpiration = 0.25\ntimezone = \"Europe/Rome\"\n"
        ))
        .unwrap();
        let settings = raw.validate().unwrap();

        assert_eq!(settings.sources[0].freshness, Duration::from_secs(15 * 60));
        assert_eq!(settings.sources[0].timezone, Some(chrono_tz::Europe::Rome));
    }

    #[test]
    fn oversized_lookahead_is_config_error() {
        let raw = RawConfig::from_toml(&format!("{NINE_TO_FIVE}[scheduler]\ndays_ahead = 4000000000\n"))
            .unwrap();
        assert!(matches!(raw.validate(), Err(TaskcheckError::Config(_))));

        let raw = RawConfig::from_toml(&format!(
            "{NINE_TO_FIVE}[calendars.work]\nurl = \"https://example.com/a.ics\"\ndays_ahead = 5000\n"
        ))
        .unwrap();
        assert!(matches!(raw.validate(), Err(TaskcheckError::Config(_))));
    }

    #[test]
    fn overlapping_windows_are_config_error() {
        let raw = RawConfig::from_toml(
            "[working_hours]\nmonday = [[\"09:00\", \"12:00\"], [\"11:00\", \"13:00\"]]\n",
        )
        .unwrap();
        assert!(matches!(raw.validate(), Err(TaskcheckError::Config(_))));
    }

    #[test]
    fn bad_expiration_is_config_error() {
        let raw = RawConfig::from_toml(&format!(
            "{NINE_TO_FIVE}[calendars.work]\nurl = \"https://example.com/a.ics\"\nexpiration = \"soon\"\n"
        ))
        .unwrap();
        assert!(matches!(raw.validate(), Err(TaskcheckError::Config(_))));
    }

    #[test]
    fn unknown_timezone_is_config_error() {
        let raw = RawConfig::from_toml(&format!("timezone = \"Mars/Olympus\"\n{NINE_TO_FIVE}")).unwrap();
        assert!(matches!(raw.validate(), Err(TaskcheckError::Config(_))));
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = Settings::load(&dir.path().join("taskcheck.toml")).unwrap_err();
        assert!(matches!(err, TaskcheckError::Config(_)));
    }
}
