// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The ERD catalog.
//!
//! An ERD ("Entity Reference Designator") is a single addressable property of
//! an appliance, identified on the wire by a 4-hex-digit code such as
//! `0x1016`. The catalog is a closed, bidirectional mapping between symbolic
//! names and those codes. Each entry also records how its payload decodes,
//! see [`ErdKind`].
//!
//! # Examples
//!
//! ```
//! use smarthq_lib::erd::{Erd, ErdKind};
//!
//! let erd = Erd::from_code("0x1016").unwrap();
//! assert_eq!(erd, Erd::DoorStatus);
//! assert_eq!(erd.name(), "DOOR_STATUS");
//! assert_eq!(erd.kind(), ErdKind::Flag);
//!
//! assert_eq!(Erd::from_name("UPPER_OVEN_COOK_MODE").unwrap().code(), "0x5100");
//! assert!(Erd::from_code("0x9999").is_err());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::UnknownErdError;

/// How the payload of an ERD is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErdKind {
    /// Boolean: any non-zero payload is `true`. Written as `01` / `00`.
    Flag,
    /// Cook mode record: byte 0 is the mode, bytes 1-2 the target
    /// temperature in Fahrenheit (big-endian), remaining bytes opaque.
    CookMode,
    /// Unsigned big-endian integer of up to eight bytes.
    Integer,
    /// Unsigned big-endian temperature in Fahrenheit, one or two bytes.
    Fahrenheit,
    /// NUL-padded ASCII text.
    Ascii,
    /// Opaque bytes, passed through unchanged.
    Raw,
}

impl ErdKind {
    /// Returns a short lowercase label for diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::CookMode => "cook mode",
            Self::Integer => "integer",
            Self::Fahrenheit => "temperature",
            Self::Ascii => "text",
            Self::Raw => "raw",
        }
    }
}

macro_rules! erd_catalog {
    ($( $variant:ident => ($name:literal, $code:literal, $kind:ident), )*) => {
        /// A catalog entry.
        ///
        /// Serializes as its wire code and deserializes from either its
        /// wire code or its symbolic name.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[allow(missing_docs)]
        pub enum Erd {
            $( $variant, )*
        }

        impl Erd {
            const ALL: &'static [Erd] = &[ $( Erd::$variant, )* ];

            /// Returns the wire code, lowercase with a `0x` prefix.
            #[must_use]
            pub const fn code(self) -> &'static str {
                match self {
                    $( Self::$variant => $code, )*
                }
            }

            /// Returns the symbolic name.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $name, )*
                }
            }

            /// Returns the payload interpretation.
            #[must_use]
            pub const fn kind(self) -> ErdKind {
                match self {
                    $( Self::$variant => ErdKind::$kind, )*
                }
            }
        }
    };
}

erd_catalog! {
    // Common
    ApplianceType => ("APPLIANCE_TYPE", "0x0008", Integer),
    ClockFormat => ("CLOCK_FORMAT", "0x0006", Integer),
    ClockTime => ("CLOCK_TIME", "0x0005", Raw),
    ModelNumber => ("MODEL_NUMBER", "0x0001", Ascii),
    SabbathMode => ("SABBATH_MODE", "0x0009", Flag),
    SerialNumber => ("SERIAL_NUMBER", "0x0002", Ascii),
    SoundLevel => ("SOUND_LEVEL", "0x000a", Integer),
    TemperatureUnit => ("TEMPERATURE_UNIT", "0x0007", Integer),
    UserInterfaceLocked => ("USER_INTERFACE_LOCKED", "0x0004", Flag),
    UnitType => ("UNIT_TYPE", "0x0035", Integer),

    // Firmware
    WifiModuleUpdating => ("WIFI_MODULE_UPDATING", "0x0099", Flag),
    WifiModuleSwVersion => ("WIFI_MODULE_SW_VERSION", "0x0100", Raw),
    WifiModuleSwVersionAvailable => ("WIFI_MODULE_SW_VERSION_AVAILABLE", "0x0101", Raw),
    AcmUpdating => ("ACM_UPDATING", "0x0102", Flag),
    ApplianceSwVersion => ("APPLIANCE_SW_VERSION", "0x0103", Raw),
    ApplianceSwVersionAvailable => ("APPLIANCE_SW_VERSION_AVAILABLE", "0x0104", Raw),
    ApplianceUpdating => ("APPLIANCE_UPDATING", "0x0105", Flag),
    LcdSwVersion => ("LCD_SW_VERSION", "0x0106", Raw),
    LcdSwVersionAvailable => ("LCD_SW_VERSION_AVAILABLE", "0x0107", Raw),
    LcdUpdating => ("LCD_UPDATING", "0x0108", Flag),

    // Refrigerator
    AirFilterStatus => ("AIR_FILTER_STATUS", "0x101c", Raw),
    DoorStatus => ("DOOR_STATUS", "0x1016", Flag),
    FridgeModelInfo => ("FRIDGE_MODEL_INFO", "0x101d", Raw),
    HotWaterInUse => ("HOT_WATER_IN_USE", "0x1018", Flag),
    HotWaterSetTemp => ("HOT_WATER_SET_TEMP", "0x1011", Fahrenheit),
    HotWaterStatus => ("HOT_WATER_STATUS", "0x1010", Raw),
    IceMakerBucketStatus => ("ICE_MAKER_BUCKET_STATUS", "0x1007", Raw),
    IceMakerControl => ("ICE_MAKER_CONTROL", "0x100a", Raw),
    SetpointLimits => ("SETPOINT_LIMITS", "0x100b", Raw),
    CurrentTemperature => ("CURRENT_TEMPERATURE", "0x1004", Raw),
    TemperatureSetting => ("TEMPERATURE_SETTING", "0x1005", Raw),
    TurboCoolStatus => ("TURBO_COOL_STATUS", "0x100f", Flag),
    TurboFreezeStatus => ("TURBO_FREEZE_STATUS", "0x100e", Flag),
    WaterFilterStatus => ("WATER_FILTER_STATUS", "0x1009", Raw),
    FridgeUnknown1012 => ("FRIDGE_UNKNOWN_1012", "0x1012", Raw),
    FridgeUnknown1013 => ("FRIDGE_UNKNOWN_1013", "0x1013", Raw),
    FridgeUnknown1019 => ("FRIDGE_UNKNOWN_1019", "0x1019", Raw),
    ConvertableDrawerMode => ("CONVERTABLE_DRAWER_MODE", "0x1020", Raw),
    InteriorLight => ("INTERIOR_LIGHT", "0x1024", Integer),
    ProximityLight => ("PROXIMITY_LIGHT", "0x1028", Flag),
    FridgeUnknown1029 => ("FRIDGE_UNKNOWN_1029", "0x1029", Raw),
    LockoutMode => ("LOCKOUT_MODE", "0x102c", Raw),
    DisplayMode => ("DISPLAY_MODE", "0x102d", Raw),
    FridgeUnknown102E => ("FRIDGE_UNKNOWN_102E", "0x102e", Raw),
    FridgeUnknown1100 => ("FRIDGE_UNKNOWN_1100", "0x1100", Raw),
    FridgeUnknown1101 => ("FRIDGE_UNKNOWN_1101", "0x1101", Raw),
    FridgeUnknown1102 => ("FRIDGE_UNKNOWN_1102", "0x1102", Raw),
    FridgeUnknown1103 => ("FRIDGE_UNKNOWN_1103", "0x1103", Raw),
    FridgeUnknown1104 => ("FRIDGE_UNKNOWN_1104", "0x1104", Raw),

    // Oven
    ActiveFCodeStatus => ("ACTIVE_F_CODE_STATUS", "0x5005", Flag),
    ConvectionConversion => ("CONVECTION_CONVERSION", "0x5003", Flag),
    ElapsedOnTime => ("ELAPSED_ON_TIME", "0x5004", Integer),
    EndTone => ("END_TONE", "0x5001", Integer),
    Hour12ShutoffEnabled => ("HOUR_12_SHUTOFF_ENABLED", "0x5000", Flag),
    KeyPressed => ("KEY_PRESSED", "0x5006", Raw),
    LightBar => ("LIGHT_BAR", "0x5002", Flag),
    OvenConfiguration => ("OVEN_CONFIGURATION", "0x5007", Raw),
    OvenModeMinMaxTemp => ("OVEN_MODE_MIN_MAX_TEMP", "0x5008", Raw),
    WarmingDrawerState => ("WARMING_DRAWER_STATE", "0x5009", Integer),

    LowerOvenAvailableCookModes => ("LOWER_OVEN_AVAILABLE_COOK_MODES", "0x520b", Raw),
    LowerOvenExtendedCookModes => ("LOWER_OVEN_EXTENDED_COOK_MODES", "0x5213", Raw),
    LowerOvenCookMode => ("LOWER_OVEN_COOK_MODE", "0x5200", CookMode),
    LowerOvenCookTimeRemaining => ("LOWER_OVEN_COOK_TIME_REMAINING", "0x5204", Integer),
    LowerOvenCurrentState => ("LOWER_OVEN_CURRENT_STATE", "0x5201", Integer),
    LowerOvenDelayTimeRemaining => ("LOWER_OVEN_DELAY_TIME_REMAINING", "0x5202", Integer),
    LowerOvenDisplayTemperature => ("LOWER_OVEN_DISPLAY_TEMPERATURE", "0x5209", Fahrenheit),
    LowerOvenElapsedCookTime => ("LOWER_OVEN_ELAPSED_COOK_TIME", "0x5208", Integer),
    LowerOvenKitchenTimer => ("LOWER_OVEN_KITCHEN_TIMER", "0x5205", Integer),
    LowerOvenProbeDisplayTemp => ("LOWER_OVEN_PROBE_DISPLAY_TEMP", "0x5203", Fahrenheit),
    LowerOvenProbePresent => ("LOWER_OVEN_PROBE_PRESENT", "0x5207", Flag),
    LowerOvenRemoteEnabled => ("LOWER_OVEN_REMOTE_ENABLED", "0x520a", Flag),
    LowerOvenUserTempOffset => ("LOWER_OVEN_USER_TEMP_OFFSET", "0x5206", Raw),
    LowerOvenWarmingDrawerState => ("LOWER_OVEN_WARMING_DRAWER_STATE", "0x520c", Integer),
    LowerOvenRawTemperature => ("LOWER_OVEN_RAW_TEMPERATURE", "0x520d", Fahrenheit),
    LowerOvenLight => ("LOWER_OVEN_LIGHT", "0x5211", Flag),
    LowerOvenLightAvailability => ("LOWER_OVEN_LIGHT_AVAILABILITY", "0x5212", Flag),

    UpperOvenAvailableCookModes => ("UPPER_OVEN_AVAILABLE_COOK_MODES", "0x510b", Raw),
    UpperOvenExtendedCookModes => ("UPPER_OVEN_EXTENDED_COOK_MODES", "0x5113", Raw),
    UpperOvenCookMode => ("UPPER_OVEN_COOK_MODE", "0x5100", CookMode),
    UpperOvenCookTimeRemaining => ("UPPER_OVEN_COOK_TIME_REMAINING", "0x5104", Integer),
    UpperOvenCurrentState => ("UPPER_OVEN_CURRENT_STATE", "0x5101", Integer),
    UpperOvenDelayTimeRemaining => ("UPPER_OVEN_DELAY_TIME_REMAINING", "0x5102", Integer),
    UpperOvenDisplayTemperature => ("UPPER_OVEN_DISPLAY_TEMPERATURE", "0x5109", Fahrenheit),
    UpperOvenElapsedCookTime => ("UPPER_OVEN_ELAPSED_COOK_TIME", "0x5108", Integer),
    UpperOvenKitchenTimer => ("UPPER_OVEN_KITCHEN_TIMER", "0x5105", Integer),
    UpperOvenProbeDisplayTemp => ("UPPER_OVEN_PROBE_DISPLAY_TEMP", "0x5103", Fahrenheit),
    UpperOvenProbePresent => ("UPPER_OVEN_PROBE_PRESENT", "0x5107", Flag),
    UpperOvenRemoteEnabled => ("UPPER_OVEN_REMOTE_ENABLED", "0x510a", Flag),
    UpperOvenUserTempOffset => ("UPPER_OVEN_USER_TEMP_OFFSET", "0x5106", Raw),
    UpperOvenWarmingDrawerState => ("UPPER_OVEN_WARMING_DRAWER_STATE", "0x510c", Integer),
    UpperOvenRawTemperature => ("UPPER_OVEN_RAW_TEMPERATURE", "0x510d", Fahrenheit),
    UpperOvenLight => ("UPPER_OVEN_LIGHT", "0x5111", Flag),
    UpperOvenLightAvailability => ("UPPER_OVEN_LIGHT_AVAILABILITY", "0x5112", Flag),

    // Cooktop
    CooktopConfig => ("COOKTOP_CONFIG", "0x551c", Raw),
    CooktopStatus => ("COOKTOP_STATUS", "0x5520", Raw),

    // Precision cooking probe
    PrecisionCookingProbeControlMode => ("PRECISION_COOKING_PROBE_CONTROL_MODE", "0x5670", Integer),
    PrecisionCookingProbeStatus => ("PRECISION_COOKING_PROBE_STATUS", "0x5671", Integer),
    PrecisionCookingProbeTempTarget => ("PRECISION_COOKING_PROBE_TEMP_TARGET", "0x5672", Fahrenheit),
    PrecisionCookingProbeTempCurrent => ("PRECISION_COOKING_PROBE_TEMP_CURRENT", "0x5673", Fahrenheit),
    PrecisionCookingProbeTimeTarget => ("PRECISION_COOKING_PROBE_TIME_TARGET", "0x5674", Integer),
    PrecisionCookingStartSousVideTimerActiveStatus => ("PRECISION_COOKING_START_SOUS_VIDE_TIMER_ACTIVE_STATUS", "0x5675", Flag),
    PrecisionCookingProbeTimeCurrent => ("PRECISION_COOKING_PROBE_TIME_CURRENT", "0x5676", Integer),
    PrecisionCookingProbeTargetTimeReached => ("PRECISION_COOKING_PROBE_TARGET_TIME_REACHED", "0x5677", Flag),
    PrecisionCookingProbeBatteryStatus => ("PRECISION_COOKING_PROBE_BATTERY_STATUS", "0x5678", Integer),

    ClosedLoopCookingConfiguration => ("CLOSED_LOOP_COOKING_CONFIGURATION", "0x5770", Raw),
}

static BY_CODE: LazyLock<HashMap<&'static str, Erd>> =
    LazyLock::new(|| Erd::ALL.iter().map(|erd| (erd.code(), *erd)).collect());

static BY_NAME: LazyLock<HashMap<&'static str, Erd>> =
    LazyLock::new(|| Erd::ALL.iter().map(|erd| (erd.name(), *erd)).collect());

impl Erd {
    /// Looks up an ERD by wire code. Matching is case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownErdError`] if the code is not in the catalog.
    pub fn from_code(code: &str) -> Result<Self, UnknownErdError> {
        let normalized = code.trim().to_ascii_lowercase();
        BY_CODE
            .get(normalized.as_str())
            .copied()
            .ok_or_else(|| UnknownErdError {
                code: code.to_string(),
            })
    }

    /// Looks up an ERD by symbolic name, e.g. `DOOR_STATUS`.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownErdError`] if the name is not in the catalog.
    pub fn from_name(name: &str) -> Result<Self, UnknownErdError> {
        BY_NAME
            .get(name.trim())
            .copied()
            .ok_or_else(|| UnknownErdError {
                code: name.to_string(),
            })
    }

    /// Returns every catalog entry.
    #[must_use]
    pub fn all() -> &'static [Erd] {
        Self::ALL
    }
}

impl fmt::Display for Erd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Erd {
    type Err = UnknownErdError;

    /// Accepts either a wire code or a symbolic name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).or_else(|_| Self::from_name(s))
    }
}

impl Serialize for Erd {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Erd {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
