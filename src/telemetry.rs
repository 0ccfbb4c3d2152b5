use anyhow::{Context, Result};
use serde::Deserialize;

/// One weewx LOOP packet as published by the wx broker. weewx's MQTT uploader
/// emits every observation as a string; an empty string (or an absent key)
/// means the station had no reading for that field, which must never be
/// treated as zero. The bridge only converts five of these, but the full
/// documented field set is carried so a report round-trips losslessly through
/// the decoder.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoopReport {
    #[serde(default, rename = "dateTime")]
    pub date_time: String,
    #[serde(default, rename = "daymaxwind_mph")]
    pub daymaxwind_mph: String,
    #[serde(default, rename = "extraHumid2")]
    pub extra_humid2: String,
    #[serde(default, rename = "extraTemp2_F")]
    pub extra_temp2_f: String,
    #[serde(default, rename = "heap_free_byte")]
    pub heap_free_byte: String,
    #[serde(default, rename = "luminosity_lux")]
    pub luminosity_lux: String,
    #[serde(default, rename = "outHumidity")]
    pub out_humidity: String,
    #[serde(default, rename = "outTemp_F")]
    pub out_temp_f: String,
    #[serde(default, rename = "p_dayRain_in")]
    pub p_day_rain_in: String,
    #[serde(default, rename = "p_monthRain_in")]
    pub p_month_rain_in: String,
    #[serde(default, rename = "p_rain_in")]
    pub p_rain_in: String,
    #[serde(default, rename = "p_rainRate_inch_per_hour")]
    pub p_rain_rate_inch_per_hour: String,
    #[serde(default, rename = "p_stormRain_in")]
    pub p_storm_rain_in: String,
    #[serde(default, rename = "p_weekRain_in")]
    pub p_week_rain_in: String,
    #[serde(default, rename = "p_yearRain_in")]
    pub p_year_rain_in: String,
    #[serde(default, rename = "pressure_inHg")]
    pub pressure_in_hg: String,
    #[serde(default, rename = "relbarometer_inHg")]
    pub relbarometer_in_hg: String,
    #[serde(default, rename = "UV")]
    pub uv: String,
    #[serde(default, rename = "uvradiation_Wpm2")]
    pub uvradiation_wpm2: String,
    #[serde(default, rename = "wh31_ch2_batt_count")]
    pub wh31_ch2_batt_count: String,
    #[serde(default, rename = "wh31_ch2_sig_count")]
    pub wh31_ch2_sig_count: String,
    #[serde(default, rename = "windDir")]
    pub wind_dir: String,
    #[serde(default, rename = "windGust_mph")]
    pub wind_gust_mph: String,
    #[serde(default, rename = "windSpeed_mph")]
    pub wind_speed_mph: String,
    #[serde(default, rename = "ws90_sig_count")]
    pub ws90_sig_count: String,
    #[serde(default, rename = "txBatteryStatus")]
    pub tx_battery_status: String,
    #[serde(default, rename = "rxCheckPercent")]
    pub rx_check_percent: String,
    #[serde(default, rename = "usUnits")]
    pub us_units: String,
    #[serde(default, rename = "radiation_Wpm2")]
    pub radiation_wpm2: String,
    #[serde(default, rename = "altimeter_inHg")]
    pub altimeter_in_hg: String,
    #[serde(default, rename = "appTemp_F")]
    pub app_temp_f: String,
    #[serde(default, rename = "barometer_inHg")]
    pub barometer_in_hg: String,
    #[serde(default, rename = "cloudbase_foot")]
    pub cloudbase_foot: String,
    #[serde(default, rename = "dewpoint_F")]
    pub dewpoint_f: String,
    #[serde(default, rename = "heatindex_F")]
    pub heatindex_f: String,
    #[serde(default, rename = "humidex_F")]
    pub humidex_f: String,
    #[serde(default, rename = "maxSolarRad_Wpm2")]
    pub max_solar_rad_wpm2: String,
    #[serde(default, rename = "rainRate_inch_per_hour")]
    pub rain_rate_inch_per_hour: String,
    #[serde(default, rename = "windchill_F")]
    pub windchill_f: String,
}

/// Decodes an inbound wx payload. There is no schema versioning and no
/// partial-record recovery: a payload that is not a JSON object is
/// fatal-at-runtime for the whole bridge.
pub fn decode_loop_payload(payload: &[u8]) -> Result<LoopReport> {
    serde_json::from_slice(payload).context("decode wx loop payload")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_core_fields() {
        let payload = br#"{
            "dateTime": "1730000000",
            "outTemp_F": "68.0",
            "dewpoint_F": "50.0",
            "outHumidity": "55",
            "barometer_inHg": "29.92",
            "windDir": "180",
            "windSpeed_mph": "4.5"
        }"#;
        let report = decode_loop_payload(payload).unwrap();
        assert_eq!(report.out_temp_f, "68.0");
        assert_eq!(report.dewpoint_f, "50.0");
        assert_eq!(report.out_humidity, "55");
        assert_eq!(report.barometer_in_hg, "29.92");
        assert_eq!(report.wind_dir, "180");
        assert_eq!(report.wind_speed_mph, "4.5");
    }

    #[test]
    fn absent_fields_decode_as_empty_strings() {
        let report = decode_loop_payload(br#"{"outTemp_F": "32.0"}"#).unwrap();
        assert_eq!(report.out_temp_f, "32.0");
        assert_eq!(report.dewpoint_f, "");
        assert_eq!(report.barometer_in_hg, "");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let report =
            decode_loop_payload(br#"{"outHumidity": "40", "someFutureField": "1"}"#).unwrap();
        assert_eq!(report.out_humidity, "40");
    }

    #[test]
    fn non_json_payload_is_an_error() {
        assert!(decode_loop_payload(b"not json at all").is_err());
    }
}
