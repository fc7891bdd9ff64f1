//! Vehicle data containers and their resource-to-gauge mapping
//!
//! Each vendor resource becomes one gauge (labeled by VIN) plus companion
//! `*_measurement_time_seconds` / `*_update_time_seconds` gauges. Values
//! arrive as strings; the mapper turns them into gauge values.

/// Parse a plain numeric value.
fn as_float(value: &str) -> Option<f64> {
    value.parse().ok()
}

/// Vendor reports kilometers, gauges carry meters.
fn km_to_m(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().map(|km| km * 1000.0)
}

/// "true"/"false" to 1/0.
fn text_bool(value: &str) -> Option<f64> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Some(1.0),
        "false" => Some(0.0),
        _ => None,
    }
}

/// Inverted boolean, for resources phrased as "unlocked".
fn text_bool_inverted(value: &str) -> Option<f64> {
    text_bool(value).map(|b| 1.0 - b)
}

/// One vendor resource and the gauge it feeds.
pub struct Resource {
    /// Resource key as it appears in container responses.
    pub key: &'static str,
    /// Metric base name; companions derive from this.
    pub base: &'static str,
    /// Unit suffix appended to the value gauge name.
    pub unit: Option<&'static str>,
    pub help: &'static str,
    pub map: fn(&str) -> Option<f64>,
}

impl Resource {
    /// Name of the value gauge.
    pub fn metric_name(&self) -> String {
        match self.unit {
            Some(unit) => format!("{}_{}", self.base, unit),
            None => self.base.to_string(),
        }
    }

    /// Gauge carrying the vendor-side measurement timestamp.
    pub fn measurement_time_name(&self) -> String {
        format!("{}_measurement_time_seconds", self.base)
    }

    /// Gauge carrying the last time this exporter saw the resource.
    pub fn update_time_name(&self) -> String {
        format!("{}_update_time_seconds", self.base)
    }
}

/// One vehicle data container and the resources expected in it.
pub struct Container {
    pub name: &'static str,
    pub resources: &'static [Resource],
}

pub const CONTAINERS: &[Container] = &[
    Container {
        name: "electricvehicle",
        resources: &[
            Resource {
                key: "soc",
                base: "mb_electric_state_of_charge",
                unit: None,
                help: "Battery state of charge in percent",
                map: as_float,
            },
            Resource {
                key: "rangeelectric",
                base: "mb_electric_range",
                unit: Some("meters"),
                help: "Remaining electric range",
                map: km_to_m,
            },
        ],
    },
    Container {
        name: "fuelstatus",
        resources: &[
            Resource {
                key: "tanklevelpercent",
                base: "mb_liquid_fuel_level",
                unit: None,
                help: "Fuel tank fill level in percent",
                map: as_float,
            },
            Resource {
                key: "rangeliquid",
                base: "mb_liquid_range",
                unit: Some("meters"),
                help: "Remaining range on liquid fuel",
                map: km_to_m,
            },
        ],
    },
    Container {
        name: "payasyoudrive",
        resources: &[Resource {
            key: "odo",
            base: "mb_odometer",
            unit: Some("meters"),
            help: "Odometer reading",
            map: km_to_m,
        }],
    },
    Container {
        name: "vehiclelockstatus",
        resources: &[
            Resource {
                key: "doorlockstatusdecklid",
                base: "mb_deck_lid_lock_status",
                unit: None,
                help: "Deck lid lock state, 1 = locked",
                map: text_bool_inverted,
            },
            Resource {
                key: "doorlockstatusvehicle",
                base: "mb_vehicle_lock_status",
                unit: None,
                help: "Vehicle lock state, 0: unlocked, 1: internal locked, \
                       2: external locked, 3: selectively unlocked",
                map: as_float,
            },
            Resource {
                key: "doorlockstatusgas",
                base: "mb_gas_tank_lock_status",
                unit: None,
                help: "Gas tank door lock state, 1 = locked",
                map: text_bool_inverted,
            },
            Resource {
                key: "positionHeading",
                base: "mb_vehicle_heading_position",
                unit: Some("degrees"),
                help: "Vehicle heading",
                map: as_float,
            },
        ],
    },
    Container {
        name: "vehiclestatus",
        resources: &[
            Resource {
                key: "decklidstatus",
                base: "mb_deck_lid_open",
                unit: None,
                help: "Deck lid latch state, 1 = open",
                map: text_bool,
            },
            Resource {
                key: "doorstatusfrontleft",
                base: "mb_door_status_front_left",
                unit: None,
                help: "Front left door state, 1 = open",
                map: text_bool,
            },
            Resource {
                key: "doorstatusfrontright",
                base: "mb_door_status_front_right",
                unit: None,
                help: "Front right door state, 1 = open",
                map: text_bool,
            },
            Resource {
                key: "doorstatusrearleft",
                base: "mb_door_status_rear_left",
                unit: None,
                help: "Rear left door state, 1 = open",
                map: text_bool,
            },
            Resource {
                key: "doorstatusrearright",
                base: "mb_door_status_rear_right",
                unit: None,
                help: "Rear right door state, 1 = open",
                map: text_bool,
            },
            Resource {
                key: "interiorLightsFront",
                base: "mb_interior_front_light_status",
                unit: None,
                help: "Front interior light, 1 = on",
                map: text_bool,
            },
            Resource {
                key: "interiorLightsRear",
                base: "mb_interior_rear_light_status",
                unit: None,
                help: "Rear interior light, 1 = on",
                map: text_bool,
            },
            Resource {
                key: "lightswitchposition",
                base: "mb_light_switch_position",
                unit: None,
                help: "Light switch position, 0: auto, 1: headlights, \
                       2: sidelight left, 3: sidelight right, 4: parking light",
                map: as_float,
            },
            Resource {
                key: "readingLampFrontLeft",
                base: "mb_reading_lamp_front_left",
                unit: None,
                help: "Front left reading lamp, 1 = on",
                map: text_bool,
            },
            Resource {
                key: "readingLampFrontRight",
                base: "mb_reading_lamp_front_right",
                unit: None,
                help: "Front right reading lamp, 1 = on",
                map: text_bool,
            },
            Resource {
                key: "rooftopstatus",
                base: "mb_roof_top_status",
                unit: None,
                help: "Convertible top state, 0: unlocked, 1: open and locked, \
                       2: closed and locked",
                map: as_float,
            },
            Resource {
                key: "sunroofstatus",
                base: "mb_sun_roof_status",
                unit: None,
                help: "Sunroof state, 0: closed, 1: open, 2: lifting open, \
                       3: running, 4: anti-booming, 5: sliding intermediate, \
                       6: lifting intermediate",
                map: as_float,
            },
            Resource {
                key: "windowstatusfrontleft",
                base: "mb_window_status_front_left",
                unit: None,
                help: "Front left window state, 0: intermediate, 1: open, \
                       2: closed, 3: airing, 4: intermediate airing, 5: running",
                map: as_float,
            },
            Resource {
                key: "windowstatusfrontright",
                base: "mb_window_status_front_right",
                unit: None,
                help: "Front right window state, 0: intermediate, 1: open, \
                       2: closed, 3: airing, 4: intermediate airing, 5: running",
                map: as_float,
            },
            Resource {
                key: "windowstatusrearleft",
                base: "mb_window_status_rear_left",
                unit: None,
                help: "Rear left window state, 0: intermediate, 1: open, \
                       2: closed, 3: airing, 4: intermediate airing, 5: running",
                map: as_float,
            },
            Resource {
                key: "windowstatusrearright",
                base: "mb_window_status_rear_right",
                unit: None,
                help: "Rear right window state, 0: intermediate, 1: open, \
                       2: closed, 3: airing, 4: intermediate airing, 5: running",
                map: as_float,
            },
        ],
    },
];
