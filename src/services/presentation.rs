//! Display mapping for interpolated rows: weather icon and formatted strings.

use serde::Serialize;
use utoipa::ToSchema;

use crate::services::interpolation::InterpolatedRow;

/// Precipitation (mm) above which cloudy buckets show rain.
const RAIN_THRESHOLD_MM: f64 = 0.5;

/// Placeholder for a missing value.
const MISSING: &str = "–";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WeatherIcon {
    Clear,
    PartlyCloudy,
    MostlyCloudy,
    CloudyWithRain,
    Overcast,
    Rain,
}

impl WeatherIcon {
    pub fn emoji(self) -> &'static str {
        match self {
            WeatherIcon::Clear => "☀️",
            WeatherIcon::PartlyCloudy => "🌤️",
            WeatherIcon::MostlyCloudy => "🌥️",
            WeatherIcon::CloudyWithRain => "🌦️",
            WeatherIcon::Overcast => "☁️",
            WeatherIcon::Rain => "🌧️",
        }
    }
}

/// Cloud-cover band `[min, max)` with its dry and wet icon.
struct IconRule {
    min: f64,
    max: f64,
    dry: WeatherIcon,
    wet: WeatherIcon,
}

// Bands overlap on [80, 90); the first matching rule wins.
const ICON_RULES: [IconRule; 4] = [
    IconRule {
        min: 80.0,
        max: f64::INFINITY,
        dry: WeatherIcon::Overcast,
        wet: WeatherIcon::Rain,
    },
    IconRule {
        min: 60.0,
        max: 90.0,
        dry: WeatherIcon::MostlyCloudy,
        wet: WeatherIcon::CloudyWithRain,
    },
    IconRule {
        min: 30.0,
        max: 60.0,
        dry: WeatherIcon::PartlyCloudy,
        wet: WeatherIcon::PartlyCloudy,
    },
    IconRule {
        min: 0.0,
        max: 30.0,
        dry: WeatherIcon::Clear,
        wet: WeatherIcon::Clear,
    },
];

/// Icon for a cloud cover (%) and precipitation (mm). Missing or negative
/// cloud cover has no icon; missing precipitation counts as dry.
pub fn select_icon(cloud_cover_pct: Option<f64>, precipitation_mm: Option<f64>) -> Option<WeatherIcon> {
    let cover = cloud_cover_pct?;
    let wet = precipitation_mm.is_some_and(|tp| tp > RAIN_THRESHOLD_MM);
    ICON_RULES
        .iter()
        .find(|rule| cover >= rule.min && cover < rule.max)
        .map(|rule| if wet { rule.wet } else { rule.dry })
}

/// Formatted cells of one forecast row.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DisplayRow {
    /// e.g. "🌥️ 72%"
    pub cloudiness: String,
    /// e.g. "14°"
    pub temperature: String,
    /// e.g. "0.6"
    pub precipitation: String,
    /// e.g. "3.2"
    pub wind: String,
    /// e.g. "1013"
    pub pressure: String,
}

fn format_or_missing(value: Option<f64>, format: impl Fn(f64) -> String) -> String {
    value.map(format).unwrap_or_else(|| MISSING.to_string())
}

pub fn format_cloudiness(cloud_cover_pct: Option<f64>, icon: Option<WeatherIcon>) -> String {
    match (cloud_cover_pct, icon) {
        (Some(cover), Some(icon)) => format!("{} {:.0}%", icon.emoji(), cover),
        (Some(cover), None) => format!("{:.0}%", cover),
        (None, _) => MISSING.to_string(),
    }
}

pub fn display_row(row: &InterpolatedRow, icon: Option<WeatherIcon>) -> DisplayRow {
    DisplayRow {
        cloudiness: format_cloudiness(row.cloud_cover_pct, icon),
        temperature: format_or_missing(row.temperature_c, |t| format!("{:.0}°", t)),
        precipitation: format_or_missing(row.precipitation_mm, |p| format!("{:.1}", p)),
        wind: format_or_missing(row.wind, |w| format!("{:.1}", w)),
        pressure: format_or_missing(row.pressure_hpa, |p| format!("{:.0}", p)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icon_thresholds() {
        assert_eq!(select_icon(Some(10.0), Some(5.0)), Some(WeatherIcon::Clear));
        assert_eq!(select_icon(Some(30.0), None), Some(WeatherIcon::PartlyCloudy));
        assert_eq!(select_icon(Some(59.9), Some(2.0)), Some(WeatherIcon::PartlyCloudy));
        assert_eq!(select_icon(Some(60.0), Some(0.2)), Some(WeatherIcon::MostlyCloudy));
        assert_eq!(select_icon(Some(70.0), Some(0.6)), Some(WeatherIcon::CloudyWithRain));
        assert_eq!(select_icon(Some(100.0), Some(0.0)), Some(WeatherIcon::Overcast));
        assert_eq!(select_icon(Some(100.0), Some(3.0)), Some(WeatherIcon::Rain));
    }

    #[test]
    fn test_overlap_band_prefers_heaviest_rule() {
        assert_eq!(select_icon(Some(85.0), Some(0.1)), Some(WeatherIcon::Overcast));
        assert_eq!(select_icon(Some(85.0), Some(1.0)), Some(WeatherIcon::Rain));
    }

    #[test]
    fn test_rain_threshold_is_exclusive() {
        assert_eq!(select_icon(Some(95.0), Some(0.5)), Some(WeatherIcon::Overcast));
    }

    #[test]
    fn test_no_icon_without_cloud_cover() {
        assert_eq!(select_icon(None, Some(3.0)), None);
        assert_eq!(select_icon(Some(-1.0), None), None);
    }

    #[test]
    fn test_icon_wire_names() {
        assert_eq!(
            serde_json::to_string(&WeatherIcon::CloudyWithRain).unwrap(),
            "\"cloudy_with_rain\""
        );
        assert_eq!(serde_json::to_string(&WeatherIcon::Clear).unwrap(), "\"clear\"");
    }

    #[test]
    fn test_display_row_formatting() {
        let row = InterpolatedRow {
            issuance_time: "2024-05-26T00:00:00Z".parse().unwrap(),
            valid_time: "2024-05-27T12:00:00Z".parse().unwrap(),
            label: "27/05".into(),
            cloud_cover_pct: Some(72.4),
            temperature_c: Some(13.6),
            precipitation_mm: Some(0.26),
            wind: Some(3.21),
            pressure_hpa: Some(1013.25),
        };
        let icon = select_icon(row.cloud_cover_pct, row.precipitation_mm);
        let display = display_row(&row, icon);
        assert_eq!(display.cloudiness, "🌥️ 72%");
        assert_eq!(display.temperature, "14°");
        assert_eq!(display.precipitation, "0.3");
        assert_eq!(display.wind, "3.2");
        assert_eq!(display.pressure, "1013");
    }

    #[test]
    fn test_missing_values_render_placeholder() {
        let row = InterpolatedRow {
            issuance_time: "2024-05-26T00:00:00Z".parse().unwrap(),
            valid_time: "2024-05-26T12:00:00Z".parse().unwrap(),
            label: "26/05".into(),
            cloud_cover_pct: None,
            temperature_c: Some(-0.6),
            precipitation_mm: None,
            wind: None,
            pressure_hpa: None,
        };
        let display = display_row(&row, None);
        assert_eq!(display.cloudiness, "–");
        assert_eq!(display.precipitation, "–");
        assert_eq!(display.temperature, "-1°");
    }
}
