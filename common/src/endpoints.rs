use serde::Serialize;

pub const FIELD_BOILER_CURRENT: &str = "ActValTempCarrier";
pub const FIELD_BOILER_TARGET: &str = "SetTempCarrier";
pub const FIELD_MODE: &str = "setMode";
pub const FIELD_ROOM_CURRENT: &str = "TempInRoom";
pub const FIELD_ROOM_TARGET: &str = "setTempRoomMode";

pub const FIELD_POWER: &str = "CurrPwr_str";
pub const FIELD_PRESSURE: &str = "ActPress";
pub const FIELD_POWER_DAY: &str = "amountActiveLevelsPerDay";
pub const FIELD_POWER_NIGHT: &str = "amountActiveLevelsAtNight";
pub const FIELD_DAY_TIME: &str = "dayTime";
pub const FIELD_NIGHT_TIME: &str = "nightTime";

pub const FIELD_ROOM_SENSOR: &str = "SensTemp0";

pub const CONTENT_TYPE_RAW: &str = "text/plain;charset=UTF-8";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    MainParams,
    OtherParams,
    AdditionalParams,
    ChangeBoilerTarget,
    ChangeRoomTarget,
    SwitchMode,
    ApplyPowerDay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Endpoint {
    pub const ALL: [Endpoint; 7] = [
        Self::MainParams,
        Self::OtherParams,
        Self::AdditionalParams,
        Self::ChangeBoilerTarget,
        Self::ChangeRoomTarget,
        Self::SwitchMode,
        Self::ApplyPowerDay,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Self::MainParams => "main_params",
            Self::OtherParams => "other_params",
            Self::AdditionalParams => "additional_params",
            Self::ChangeBoilerTarget => "change_crrtrg",
            Self::ChangeRoomTarget => "change_rmtrg",
            Self::SwitchMode => "switch_mode",
            Self::ApplyPowerDay => "apply_power_day",
        }
    }

    pub fn method(self) -> Method {
        match self {
            Self::MainParams | Self::OtherParams | Self::AdditionalParams => Method::Get,
            _ => Method::Post,
        }
    }

    pub fn url(self, host: &str) -> String {
        format!("http://{}/{}", host.trim_end_matches('/'), self.path())
    }
}

/// Body of a command sent to one of the POST endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// Bracketed literal such as `[35.0]`, sent as plain text.
    Raw(String),
    /// URL-encoded form fields.
    Form(Vec<(String, String)>),
}

impl RequestBody {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Raw(_) => CONTENT_TYPE_RAW,
            Self::Form(_) => CONTENT_TYPE_FORM,
        }
    }

    pub fn form_value(&self, key: &str) -> Option<&str> {
        match self {
            Self::Form(fields) => fields
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.as_str()),
            Self::Raw(_) => None,
        }
    }
}
