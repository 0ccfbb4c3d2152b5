use crate::telemetry::LoopReport;

const INHG_TO_HPA: f64 = 33.86389;

/// A single converted observation, ready to publish.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metric {
    pub name: &'static str,
    pub value: f64,
}

/// Converts the fields the overlay cares about into metric units. Emission
/// order is fixed: temperature, dewpoint, humidity, pressure, winddir. An
/// empty source field produces no metric; a field that fails to parse is
/// logged and skipped without affecting the rest.
pub fn convert(report: &LoopReport) -> Vec<Metric> {
    let mut metrics = Vec::with_capacity(5);

    if let Some(temp_f) = parse_field("temperature", &report.out_temp_f) {
        metrics.push(Metric {
            name: "temperature",
            value: fahrenheit_to_celsius(temp_f),
        });
    }

    if let Some(dewpoint_f) = parse_field("dewpoint", &report.dewpoint_f) {
        metrics.push(Metric {
            name: "dewpoint",
            value: fahrenheit_to_celsius(dewpoint_f),
        });
    }

    if let Some(humidity) = parse_field("humidity", &report.out_humidity) {
        metrics.push(Metric {
            name: "humidity",
            value: humidity,
        });
    }

    if let Some(barometer) = parse_field("pressure", &report.barometer_in_hg) {
        metrics.push(Metric {
            name: "pressure",
            value: inhg_to_hpa(barometer),
        });
    }

    if let Some(wind_dir) = parse_field("winddir", &report.wind_dir) {
        metrics.push(Metric {
            name: "winddir",
            value: wind_dir,
        });
    }

    metrics
}

/// Renders a metric value the way the allsky overlay expects it: fixed-point,
/// exactly three fractional digits.
pub fn format_value(value: f64) -> String {
    format!("{value:.3}")
}

fn parse_field(name: &'static str, raw: &str) -> Option<f64> {
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<f64>() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::error!(field = name, raw, error = %err, "failed to parse wx field");
            None
        }
    }
}

fn fahrenheit_to_celsius(value: f64) -> f64 {
    (value - 32.0) / 1.8
}

fn inhg_to_hpa(value: f64) -> f64 {
    value * INHG_TO_HPA
}
