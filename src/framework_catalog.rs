//! Centralized catalog of the Android framework surface the analysis models.
//!
//! Calls to the APIs listed here are never descended into. The flow analysis
//! and the value-flow graph special-case them instead, using the argument
//! positions recorded in each [`ModeledApi`].
//!
//! Notes:
//! - Matching is on the full `<class: subsignature>` of the static target.
//! - Keep allowlists explicit; no name-based heuristics.

use crate::hierarchy::Hierarchy;
use crate::program::ClassId;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

// ============================================================================
// Watch face framework classes and callbacks
// ============================================================================

pub const CANVAS_ENGINE: &str = "android.support.wearable.watchface.CanvasWatchFaceService$Engine";
pub const GLES2_ENGINE: &str = "android.support.wearable.watchface.Gles2WatchFaceService$Engine";
pub const CANVAS_SERVICE: &str = "android.support.wearable.watchface.CanvasWatchFaceService";
pub const GLES2_SERVICE: &str = "android.support.wearable.watchface.Gles2WatchFaceService";

/// Package whose own engine subclasses are framework, not application, code.
const SUPPORT_PACKAGE: &str = "android.support";

pub const ENGINE_ON_CREATE: &str = "void onCreate(android.view.SurfaceHolder)";
pub const ENGINE_ON_DESTROY: &str = "void onDestroy()";
pub const ON_VISIBILITY_CHANGED: &str = "void onVisibilityChanged(boolean)";
pub const ON_AMBIENT_MODE_CHANGED: &str = "void onAmbientModeChanged(boolean)";
pub const ON_DRAW: &str = "void onDraw(android.graphics.Canvas,android.graphics.Rect)";
pub const SERVICE_ON_CREATE: &str = "void onCreate()";
pub const SERVICE_ON_DESTROY: &str = "void onDestroy()";

/// Sub-signature of `onCreateEngine` for a service returning `engine`.
pub fn on_create_engine(engine: &str) -> String {
    format!("{engine} onCreateEngine()")
}

pub const IS_IN_AMBIENT_MODE: &str = "boolean isInAmbientMode()";
pub const IS_VISIBLE: &str = "boolean isVisible()";

pub const ON_SENSOR_CHANGED: &str = "void onSensorChanged(android.hardware.SensorEvent)";

/// Accessors whose result the parameterized analysis replaces with its hypothesis.
pub fn is_state_accessor(sub_signature: &str) -> bool {
    sub_signature == IS_IN_AMBIENT_MODE || sub_signature == IS_VISIBLE
}

/// Application subclass of one of the watch face engine base classes.
pub fn is_watch_face_engine(hierarchy: &Hierarchy<'_>, class: ClassId) -> bool {
    is_framework_subclass(hierarchy, class, &[CANVAS_ENGINE, GLES2_ENGINE])
}

pub fn is_watch_face_service(hierarchy: &Hierarchy<'_>, class: ClassId) -> bool {
    is_framework_subclass(hierarchy, class, &[CANVAS_SERVICE, GLES2_SERVICE])
}

fn is_framework_subclass(hierarchy: &Hierarchy<'_>, class: ClassId, bases: &[&str]) -> bool {
    let c = hierarchy.program().class(class);
    if !c.is_application() || c.name.starts_with(SUPPORT_PACKAGE) || bases.contains(&c.name.as_str()) {
        return false;
    }
    bases.iter().any(|base| hierarchy.is_subtype_of_name(class, base))
}

// ============================================================================
// Modeled APIs
// ============================================================================

/// What a modeled framework call does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiKind {
    GetSensor,
    RegisterSensorListener,
    UnregisterSensorListener,
    RequestLocationUpdates,
    RemoveLocationUpdates,
    PaintSetColor,
    PaintSetAntiAlias,
    CanvasDrawColor,
    ParseColor,
    ContainerGet,
}

/// Resource whose listener registrations are balanced by the leak detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Sensor,
    Location,
}

impl Resource {
    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Sensor => "sensor",
            Resource::Location => "location",
        }
    }
}

impl ApiKind {
    pub fn resource(self) -> Option<Resource> {
        match self {
            ApiKind::RegisterSensorListener | ApiKind::UnregisterSensorListener => Some(Resource::Sensor),
            ApiKind::RequestLocationUpdates | ApiKind::RemoveLocationUpdates => Some(Resource::Location),
            _ => None,
        }
    }

    pub fn is_acquire(self) -> bool {
        matches!(self, ApiKind::RegisterSensorListener | ApiKind::RequestLocationUpdates)
    }

    pub fn is_release(self) -> bool {
        matches!(self, ApiKind::UnregisterSensorListener | ApiKind::RemoveLocationUpdates)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeledApi {
    pub signature: &'static str,
    pub kind: ApiKind,
    /// Argument holding the listener, for register/unregister APIs.
    pub listener: Option<usize>,
    /// Argument holding the sensor object (listener APIs), the sensor type
    /// (`GetSensor`), or the color, flag or color name (drawing APIs).
    /// `None` on a listener API means "every object of the listener".
    pub operand: Option<usize>,
}

const fn api(signature: &'static str, kind: ApiKind, listener: Option<usize>, operand: Option<usize>) -> ModeledApi {
    ModeledApi {
        signature,
        kind,
        listener,
        operand,
    }
}

pub static MODELED_APIS: &[ModeledApi] = &[
    // SensorManager
    api(
        "<android.hardware.SensorManager: android.hardware.Sensor getDefaultSensor(int)>",
        ApiKind::GetSensor,
        None,
        Some(0),
    ),
    api(
        "<android.hardware.SensorManager: android.hardware.Sensor getDefaultSensor(int,boolean)>",
        ApiKind::GetSensor,
        None,
        Some(0),
    ),
    api(
        "<android.hardware.SensorManager: java.util.List getSensorList(int)>",
        ApiKind::GetSensor,
        None,
        Some(0),
    ),
    api(
        "<android.hardware.SensorManager: boolean registerListener(android.hardware.SensorEventListener,android.hardware.Sensor,int)>",
        ApiKind::RegisterSensorListener,
        Some(0),
        Some(1),
    ),
    api(
        "<android.hardware.SensorManager: boolean registerListener(android.hardware.SensorEventListener,android.hardware.Sensor,int,int)>",
        ApiKind::RegisterSensorListener,
        Some(0),
        Some(1),
    ),
    api(
        "<android.hardware.SensorManager: boolean registerListener(android.hardware.SensorEventListener,android.hardware.Sensor,int,android.os.Handler)>",
        ApiKind::RegisterSensorListener,
        Some(0),
        Some(1),
    ),
    api(
        "<android.hardware.SensorManager: boolean registerListener(android.hardware.SensorEventListener,android.hardware.Sensor,int,int,android.os.Handler)>",
        ApiKind::RegisterSensorListener,
        Some(0),
        Some(1),
    ),
    api(
        "<android.hardware.SensorManager: void unregisterListener(android.hardware.SensorEventListener)>",
        ApiKind::UnregisterSensorListener,
        Some(0),
        None,
    ),
    api(
        "<android.hardware.SensorManager: void unregisterListener(android.hardware.SensorEventListener,android.hardware.Sensor)>",
        ApiKind::UnregisterSensorListener,
        Some(0),
        Some(1),
    ),
    // LocationManager; PendingIntent variants carry no listener and produce no label.
    api(
        "<android.location.LocationManager: void requestLocationUpdates(long,float,android.location.Criteria,android.app.PendingIntent)>",
        ApiKind::RequestLocationUpdates,
        None,
        None,
    ),
    api(
        "<android.location.LocationManager: void requestLocationUpdates(long,float,android.location.Criteria,android.location.LocationListener,android.os.Looper)>",
        ApiKind::RequestLocationUpdates,
        Some(3),
        None,
    ),
    api(
        "<android.location.LocationManager: void requestLocationUpdates(java.lang.String,long,float,android.location.LocationListener)>",
        ApiKind::RequestLocationUpdates,
        Some(3),
        None,
    ),
    api(
        "<android.location.LocationManager: void requestLocationUpdates(java.lang.String,long,float,android.location.LocationListener,android.os.Looper)>",
        ApiKind::RequestLocationUpdates,
        Some(3),
        None,
    ),
    api(
        "<android.location.LocationManager: void requestLocationUpdates(java.lang.String,long,float,android.app.PendingIntent)>",
        ApiKind::RequestLocationUpdates,
        None,
        None,
    ),
    api(
        "<android.location.LocationManager: void requestSingleUpdate(java.lang.String,android.app.PendingIntent)>",
        ApiKind::RequestLocationUpdates,
        None,
        None,
    ),
    api(
        "<android.location.LocationManager: void requestSingleUpdate(java.lang.String,android.location.LocationListener,android.os.Looper)>",
        ApiKind::RequestLocationUpdates,
        Some(1),
        None,
    ),
    api(
        "<android.location.LocationManager: void requestSingleUpdate(android.location.Criteria,android.location.LocationListener,android.os.Looper)>",
        ApiKind::RequestLocationUpdates,
        Some(1),
        None,
    ),
    api(
        "<android.location.LocationManager: void requestSingleUpdate(android.location.Criteria,android.app.PendingIntent)>",
        ApiKind::RequestLocationUpdates,
        None,
        None,
    ),
    api(
        "<android.location.LocationManager: void removeUpdates(android.location.LocationListener)>",
        ApiKind::RemoveLocationUpdates,
        Some(0),
        None,
    ),
    api(
        "<android.location.LocationManager: void removeUpdates(android.app.PendingIntent)>",
        ApiKind::RemoveLocationUpdates,
        None,
        None,
    ),
    // Paint / Canvas / Color
    api("<android.graphics.Paint: void setColor(int)>", ApiKind::PaintSetColor, None, Some(0)),
    api(
        "<android.graphics.Paint: void setAntiAlias(boolean)>",
        ApiKind::PaintSetAntiAlias,
        None,
        Some(0),
    ),
    api("<android.graphics.Canvas: void drawColor(int)>", ApiKind::CanvasDrawColor, None, Some(0)),
    api(
        "<android.graphics.Canvas: void drawColor(int,android.graphics.PorterDuff$Mode)>",
        ApiKind::CanvasDrawColor,
        None,
        Some(0),
    ),
    api(
        "<android.graphics.Color: int parseColor(java.lang.String)>",
        ApiKind::ParseColor,
        None,
        Some(0),
    ),
    // Containers
    api("<java.util.List: java.lang.Object get(int)>", ApiKind::ContainerGet, None, None),
];

/// Look up the model of a framework method by its full signature.
pub fn lookup(signature: &str) -> Option<&'static ModeledApi> {
    static INDEX: OnceLock<HashMap<&'static str, &'static ModeledApi>> = OnceLock::new();
    INDEX
        .get_or_init(|| MODELED_APIS.iter().map(|api| (api.signature, api)).collect())
        .get(signature)
        .copied()
}

// ============================================================================
// Sensor types
// ============================================================================

pub const SENSOR_TYPE_STEP_COUNTER: i32 = 19;

const SENSOR_NAMES: [&str; 25] = [
    "accelerometer",
    "magnetic_field",
    "orientation",
    "gyroscope",
    "light",
    "pressure",
    "temperature",
    "proximity",
    "gravity",
    "linear_acceleration",
    "rotation_vector",
    "relative_humidity",
    "ambient_temperature",
    "magnetic_field_uncalibrated",
    "game_rotation_vector",
    "gyroscope_uncalibrated",
    "significant_motion",
    "step_detector",
    "step_counter",
    "geomagnetic_rotation_vector",
    "heart_rate",
    "tilt_detector",
    "wake_gesture",
    "glance_gesture",
    "pick_up_gesture",
];

/// Platform name of a `Sensor.TYPE_*` constant.
pub fn sensor_name(sensor_type: i32) -> Option<&'static str> {
    usize::try_from(sensor_type)
        .ok()
        .and_then(|t| t.checked_sub(1))
        .and_then(|idx| SENSOR_NAMES.get(idx))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_signatures_are_unique_and_resolvable() {
        for api in MODELED_APIS {
            assert_eq!(lookup(api.signature), Some(api));
        }
        let unique: std::collections::HashSet<_> = MODELED_APIS.iter().map(|a| a.signature).collect();
        assert_eq!(unique.len(), MODELED_APIS.len());
    }

    #[test]
    fn register_and_unregister_positions() {
        let reg = lookup(
            "<android.hardware.SensorManager: boolean registerListener(android.hardware.SensorEventListener,android.hardware.Sensor,int)>",
        )
        .unwrap();
        assert!(reg.kind.is_acquire());
        assert_eq!((reg.listener, reg.operand), (Some(0), Some(1)));

        let unreg = lookup("<android.hardware.SensorManager: void unregisterListener(android.hardware.SensorEventListener)>")
            .unwrap();
        assert!(unreg.kind.is_release());
        assert_eq!((unreg.listener, unreg.operand), (Some(0), None));
        assert_eq!(unreg.kind.resource(), Some(Resource::Sensor));
    }

    #[test]
    fn sensor_names_follow_platform_constants() {
        assert_eq!(sensor_name(1), Some("accelerometer"));
        assert_eq!(sensor_name(SENSOR_TYPE_STEP_COUNTER), Some("step_counter"));
        assert_eq!(sensor_name(21), Some("heart_rate"));
        assert_eq!(sensor_name(0), None);
        assert_eq!(sensor_name(26), None);
        assert_eq!(sensor_name(-1), None);
    }
}
