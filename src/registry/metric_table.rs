use crate::models::{Capability, MetricDefinition, MetricKind};

/// Column names and topic paths below are the schema seen by downstream
/// storage. Bump this on every rename.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct TableRow {
    /// Capability required for the row to be enabled, `None` for always
    pub requires: Option<Capability>,
    pub definition: MetricDefinition,
}

fn row(requires: Option<Capability>, identifier: &str, kind: MetricKind, column: &str, path: &str, label: &str) -> TableRow {
    TableRow {
        requires,
        definition: MetricDefinition::new(identifier, kind, column, path, label),
    }
}

pub fn canonical_table() -> Vec<TableRow> {
    use MetricKind::*;
    let l23 = Some(Capability::ThreePhase);
    let gas = Some(Capability::Gas);

    vec![
        // Telegram metadata
        row(None, "1-3:0.2.8",   Meta,     "",          "", "SMR protocol version"),
        row(None, "0-0:1.0.0",   Meta,     "timestamp", "", "telegram timestamp"),
        row(None, "0-0:96.1.1",  MetaText, "meter_sn",  "", "meter serial number"),

        // Meter readings and tariff
        row(None, "1-0:1.8.1",   Float, "delivered_low",    "/energy/mains/reading/delivered/low",    "total delivered energy (low tariff)"),
        row(None, "1-0:1.8.2",   Float, "delivered_high",   "/energy/mains/reading/delivered/high",   "total delivered energy (high tariff)"),
        row(None, "1-0:2.8.1",   Float, "redelivered_low",  "/energy/mains/reading/redelivered/low",  "total redelivered (low tariff)"),
        row(None, "1-0:2.8.2",   Float, "redelivered_high", "/energy/mains/reading/redelivered/high", "total redelivered (high tariff)"),
        row(None, "0-0:96.14.0", Bare,  "tariff",           "/energy/mains/reading/tariff",           "tariff"),

        // Instantaneous values
        row(None, "1-0:1.7.0",   Float, "P_total",            "/energy/mains/power/total",            "total power"),
        row(None, "1-0:2.7.0",   Float, "P_total_redelivery", "/energy/mains/power/total_redelivery", "total redelivery power"),
        row(None, "1-0:21.7.0",  Float, "P_L1",               "/energy/mains/power/L1",               "L1 power"),
        row(None, "1-0:22.7.0",  Float, "P_L1_redelivery",    "/energy/mains/power/L1_redelivery",    "L1 redelivery power"),
        row(None, "1-0:32.7.0",  Float, "V_L1",               "/energy/mains/voltage/L1",             "L1 voltage"),
        row(None, "1-0:31.7.0",  Float, "I_L1",               "/energy/mains/current/L1",             "L1 current"),
        row(l23,  "1-0:41.7.0",  Float, "P_L2",               "/energy/mains/power/L2",               "L2 power"),
        row(l23,  "1-0:42.7.0",  Float, "P_L2_redelivery",    "/energy/mains/power/L2_redelivery",    "L2 redelivery power"),
        row(l23,  "1-0:52.7.0",  Float, "V_L2",               "/energy/mains/voltage/L2",             "L2 voltage"),
        row(l23,  "1-0:51.7.0",  Float, "I_L2",               "/energy/mains/current/L2",             "L2 current"),
        row(l23,  "1-0:61.7.0",  Float, "P_L3",               "/energy/mains/power/L3",               "L3 power"),
        row(l23,  "1-0:62.7.0",  Float, "P_L3_redelivery",    "/energy/mains/power/L3_redelivery",    "L3 redelivery power"),
        row(l23,  "1-0:72.7.0",  Float, "V_L3",               "/energy/mains/voltage/L3",             "L3 voltage"),
        row(l23,  "1-0:71.7.0",  Float, "I_L3",               "/energy/mains/current/L3",             "L3 current"),

        // Gas meter on M-Bus channel 1
        row(gas,  "0-1:24.1.0",  Bare,     "",             "",                    "gas meter device type"),
        row(gas,  "0-1:96.1.0",  MetaText, "gas_meter_sn", "",                    "gas meter serial number"),
        row(gas,  "0-1:24.2.1",  Gas,      "gas_reading",  "/energy/gas/reading", "gas meter last reading"),

        // Power quality reports
        row(None, "0-0:96.7.21", Bare,  "failures",      "/energy/mains/report/powerfailures",        "power failures"),
        row(None, "0-0:96.7.9",  Bare,  "long_failures", "/energy/mains/report/powerfailures_long",   "long power failures"),
        row(None, "1-0:99.97.0", Other, "failure_log",   "/energy/mains/report/powerfailure_details", "power failure event log"),
        row(None, "1-0:32.32.0", Bare,  "L1_sags",       "/energy/mains/report/voltage_sags/L1",      "L1 voltage sags"),
        row(None, "1-0:32.36.0", Bare,  "L1_swells",     "/energy/mains/report/voltage_swells/L1",    "L1 voltage swells"),
        row(l23,  "1-0:52.32.0", Bare,  "L2_sags",       "/energy/mains/report/voltage_sags/L2",      "L2 voltage sags"),
        row(l23,  "1-0:52.36.0", Bare,  "L2_swells",     "/energy/mains/report/voltage_swells/L2",    "L2 voltage swells"),
        row(l23,  "1-0:72.32.0", Bare,  "L3_sags",       "/energy/mains/report/voltage_sags/L3",      "L3 voltage sags"),
        row(l23,  "1-0:72.36.0", Bare,  "L3_swells",     "/energy/mains/report/voltage_swells/L3",    "L3 voltage swells"),

        // Both message identifiers feed the same column and topic
        row(None, "0-0:96.13.0", Text, "message", "/energy/mains/message", "text message"),
        row(None, "0-0:96.13.1", Text, "message", "/energy/mains/message", "text message"),
    ]
}

/// A complete DSMR 4.2 telegram of a single phase meter with a gas meter attached
pub fn example_telegram() -> &'static str {
    "/ISk5\\2MT382-1000\r
\r
1-3:0.2.8(50)\r
0-0:1.0.0(101209113020W)\r
0-0:96.1.1(4B384547303034303436333935353037)\r
1-0:1.8.1(123456.789*kWh)\r
1-0:1.8.2(123456.789*kWh)\r
1-0:2.8.1(123456.789*kWh)\r
1-0:2.8.2(123456.789*kWh)\r
0-0:96.14.0(0002)\r
1-0:1.7.0(01.193*kW)\r
1-0:2.7.0(00.000*kW)\r
0-0:96.7.21(00004)\r
0-0:96.7.9(00002)\r
1-0:99.97.0(2)(0-0:96.7.19)(101208152415W)(0000000240*s)(101208151004W)(0000000301*s)\r
1-0:32.32.0(00002)\r
1-0:32.36.0(00000)\r
0-0:96.13.1(3031203631203831)\r
0-0:96.13.0(303132333435363738393A3B3C3D3E3F)\r
1-0:31.7.0(001*A)\r
1-0:21.7.0(01.111*kW)\r
1-0:22.7.0(00.000*kW)\r
0-1:24.1.0(003)\r
0-1:96.1.0(3232323241424344313233343536373839)\r
0-1:24.2.1(101209112500W)(12785.123*m3)\r
!\r
"
}
