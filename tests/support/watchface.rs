#![allow(dead_code)]

use wearleak::framework_catalog::{CANVAS_ENGINE, CANVAS_SERVICE};
use wearleak::hierarchy::OBJECT_CLASS;
use wearleak::program::builder::{BodyBuilder, ProgramBuilder};
use wearleak::program::{ClassId, CmpOp, FieldId, InvokeKind, LocalId, MethodId, Program};

pub const ENGINE: &str = "com.example.face.FaceService$Engine";
pub const SERVICE: &str = "com.example.face.FaceService";

pub const HEART_RATE: i32 = 21;
pub const BLACK: i32 = 0xFF00_0000_u32 as i32;
pub const RED: i32 = 0xFFFF_0000_u32 as i32;
pub const BLUE: i32 = 0xFF00_00FF_u32 as i32;

/// Library classes and methods a watch face model refers to.
pub struct Framework {
    pub object: ClassId,
    pub engine_base: ClassId,
    pub service_base: ClassId,
    pub listener_iface: ClassId,
    pub location_listener_iface: ClassId,
    pub sensor_manager: ClassId,
    pub location_manager: ClassId,
    pub paint: ClassId,
    pub get_default_sensor: MethodId,
    pub register: MethodId,
    pub unregister: MethodId,
    pub request_location_updates: MethodId,
    pub request_location_intent: MethodId,
    pub remove_location_updates: MethodId,
    pub set_color: MethodId,
    pub set_anti_alias: MethodId,
    pub is_in_ambient_mode: MethodId,
}

pub fn framework(b: &mut ProgramBuilder) -> Framework {
    let object = b.library_class(OBJECT_CLASS, None);
    let engine_base = b.library_class(CANVAS_ENGINE, Some(object));
    let service_base = b.library_class(CANVAS_SERVICE, Some(object));
    let listener_iface = b.interface("android.hardware.SensorEventListener", wearleak::program::Origin::Library);
    let sensor_manager = b.library_class("android.hardware.SensorManager", Some(object));
    b.library_class("android.hardware.Sensor", Some(object));
    let location_listener_iface = b.interface("android.location.LocationListener", wearleak::program::Origin::Library);
    let location_manager = b.library_class("android.location.LocationManager", Some(object));
    b.library_class("android.app.PendingIntent", Some(object));
    let paint = b.library_class("android.graphics.Paint", Some(object));

    let get_default_sensor = b.method(sensor_manager, "getDefaultSensor", &["int"], "android.hardware.Sensor", false);
    let register = b.method(
        sensor_manager,
        "registerListener",
        &["android.hardware.SensorEventListener", "android.hardware.Sensor", "int"],
        "boolean",
        false,
    );
    let unregister = b.method(
        sensor_manager,
        "unregisterListener",
        &["android.hardware.SensorEventListener"],
        "void",
        false,
    );
    let request_location_updates = b.method(
        location_manager,
        "requestLocationUpdates",
        &["java.lang.String", "long", "float", "android.location.LocationListener"],
        "void",
        false,
    );
    let request_location_intent = b.method(
        location_manager,
        "requestLocationUpdates",
        &["java.lang.String", "long", "float", "android.app.PendingIntent"],
        "void",
        false,
    );
    let remove_location_updates = b.method(
        location_manager,
        "removeUpdates",
        &["android.location.LocationListener"],
        "void",
        false,
    );
    let set_color = b.method(paint, "setColor", &["int"], "void", false);
    let set_anti_alias = b.method(paint, "setAntiAlias", &["boolean"], "void", false);
    let is_in_ambient_mode = b.method(engine_base, "isInAmbientMode", &[], "boolean", false);

    Framework {
        object,
        engine_base,
        service_base,
        listener_iface,
        location_listener_iface,
        sensor_manager,
        location_manager,
        paint,
        get_default_sensor,
        register,
        unregister,
        request_location_updates,
        request_location_intent,
        remove_location_updates,
        set_color,
        set_anti_alias,
        is_in_ambient_mode,
    }
}

/// An application engine class that is its own sensor listener.
pub struct Face {
    pub b: ProgramBuilder,
    pub fw: Framework,
    pub engine: ClassId,
    pub sm: FieldId,
    pub lm: FieldId,
    pub intent: FieldId,
    pub paint: FieldId,
    /// Never assigned, so branches on it stay unresolved.
    pub mode: FieldId,
}

impl Face {
    pub fn new() -> Self {
        let mut b = ProgramBuilder::new();
        let fw = framework(&mut b);
        let engine = b.app_class(ENGINE, Some(fw.engine_base));
        b.implements(engine, fw.listener_iface);
        b.implements(engine, fw.location_listener_iface);
        let sm = b.field(engine, "sensorManager", "android.hardware.SensorManager");
        let lm = b.field(engine, "locationManager", "android.location.LocationManager");
        let intent = b.field(engine, "updateIntent", "android.app.PendingIntent");
        let paint = b.field(engine, "paint", "android.graphics.Paint");
        let mode = b.field(engine, "mode", "int");
        Self {
            b,
            fw,
            engine,
            sm,
            lm,
            intent,
            paint,
            mode,
        }
    }

    pub fn callback(&mut self, name: &str, params: &[&str]) -> (MethodId, BodyBuilder) {
        let method = self.b.method(self.engine, name, params, "void", false);
        let body = self.b.body_for(method);
        (method, body)
    }

    pub fn finish_method(&mut self, method: MethodId, body: BodyBuilder) {
        self.b.set_body(method, body).unwrap();
    }

    /// `this.sensorManager.registerListener(this, sm.getDefaultSensor(type), 3)`
    pub fn register(&self, body: &mut BodyBuilder, sensor_type: i32) {
        let this = body.this_local();
        let n = body.len();
        let sm = body.local(&format!("sm{n}"), "android.hardware.SensorManager");
        let sensor = body.local(&format!("sensor{n}"), "android.hardware.Sensor");
        body.load_field(sm, this, self.sm);
        body.call_assign(
            sensor,
            InvokeKind::Virtual,
            self.fw.get_default_sensor,
            Some(sm),
            vec![sensor_type.into()],
        );
        body.virtual_call(sm, self.fw.register, vec![this.into(), sensor.into(), 3.into()]);
    }

    /// `this.sensorManager.unregisterListener(this)`
    pub fn unregister(&self, body: &mut BodyBuilder) {
        let this = body.this_local();
        let n = body.len();
        let sm = body.local(&format!("sm{n}"), "android.hardware.SensorManager");
        body.load_field(sm, this, self.sm);
        body.virtual_call(sm, self.fw.unregister, vec![this.into()]);
    }

    /// `this.locationManager.requestLocationUpdates("gps", 1000, 0, this)`
    pub fn request_location(&self, body: &mut BodyBuilder) {
        let this = body.this_local();
        let lm = self.load_location_manager(body);
        body.virtual_call(
            lm,
            self.fw.request_location_updates,
            vec!["gps".into(), 1000.into(), 0.into(), this.into()],
        );
    }

    /// `this.locationManager.requestLocationUpdates("gps", 1000, 0, this.updateIntent)`
    pub fn request_location_intent(&self, body: &mut BodyBuilder) {
        let this = body.this_local();
        let lm = self.load_location_manager(body);
        let n = body.len();
        let intent = body.local(&format!("intent{n}"), "android.app.PendingIntent");
        body.load_field(intent, this, self.intent);
        body.virtual_call(
            lm,
            self.fw.request_location_intent,
            vec!["gps".into(), 1000.into(), 0.into(), intent.into()],
        );
    }

    /// `this.locationManager.removeUpdates(this)`
    pub fn remove_location(&self, body: &mut BodyBuilder) {
        let this = body.this_local();
        let lm = self.load_location_manager(body);
        body.virtual_call(lm, self.fw.remove_location_updates, vec![this.into()]);
    }

    fn load_location_manager(&self, body: &mut BodyBuilder) -> LocalId {
        let this = body.this_local();
        let n = body.len();
        let lm = body.local(&format!("lm{n}"), "android.location.LocationManager");
        body.load_field(lm, this, self.lm);
        lm
    }

    /// `this.paint.setColor(color)`
    pub fn set_color(&self, body: &mut BodyBuilder, color: i32) {
        let paint = self.load_paint(body);
        body.virtual_call(paint, self.fw.set_color, vec![color.into()]);
    }

    pub fn set_anti_alias(&self, body: &mut BodyBuilder, on: bool) {
        let paint = self.load_paint(body);
        body.virtual_call(paint, self.fw.set_anti_alias, vec![i32::from(on).into()]);
    }

    fn load_paint(&self, body: &mut BodyBuilder) -> LocalId {
        let this = body.this_local();
        let n = body.len();
        let paint = body.local(&format!("paint{n}"), "android.graphics.Paint");
        body.load_field(paint, this, self.paint);
        paint
    }

    /// `if (this.mode == 0) goto target`, which no tracker can decide.
    pub fn unresolved_branch(&self, body: &mut BodyBuilder, target: wearleak::program::builder::Label) {
        let this = body.this_local();
        let n = body.len();
        let mode = body.local(&format!("mode{n}"), "int");
        body.load_field(mode, this, self.mode);
        body.branch(mode, CmpOp::Eq, 0, target);
    }

    /// `onVisibilityChanged(visible)`: register when visible, unregister otherwise.
    pub fn visibility_toggles_sensor(&mut self) -> MethodId {
        self.on_visibility(|face, body| face.register(body, HEART_RATE), Face::unregister)
    }

    /// `onVisibilityChanged(visible)`: request location updates when visible,
    /// remove them otherwise.
    pub fn visibility_toggles_location(&mut self) -> MethodId {
        self.on_visibility(Face::request_location, Face::remove_location)
    }

    fn on_visibility(
        &mut self,
        acquire: impl Fn(&Self, &mut BodyBuilder),
        release: impl Fn(&Self, &mut BodyBuilder),
    ) -> MethodId {
        let (method, mut body) = self.callback("onVisibilityChanged", &["boolean"]);
        let hidden = body.new_label();
        body.branch(body.param_local(0), CmpOp::Eq, 0, hidden);
        acquire(self, &mut body);
        body.ret(None);
        body.bind(hidden);
        release(self, &mut body);
        body.ret(None);
        self.finish_method(method, body);
        method
    }

    /// `onAmbientModeChanged(ambient)`: unregister on entering ambient mode,
    /// behind an unresolvable check when `guarded`.
    pub fn ambient_unregisters(&mut self, guarded: bool) -> MethodId {
        self.on_ambient_release(guarded, Face::unregister)
    }

    /// Like [`Face::ambient_unregisters`], for location updates.
    pub fn ambient_removes_location(&mut self, guarded: bool) -> MethodId {
        self.on_ambient_release(guarded, Face::remove_location)
    }

    fn on_ambient_release(&mut self, guarded: bool, release: impl Fn(&Self, &mut BodyBuilder)) -> MethodId {
        let (method, mut body) = self.callback("onAmbientModeChanged", &["boolean"]);
        let done = body.new_label();
        body.branch(body.param_local(0), CmpOp::Eq, 0, done);
        if guarded {
            self.unresolved_branch(&mut body, done);
        }
        release(self, &mut body);
        body.bind(done);
        body.ret(None);
        self.finish_method(method, body);
        method
    }

    /// `onAmbientModeChanged(ambient)` setting `ambient_colors` in ambient mode
    /// and `interactive_colors` otherwise.
    pub fn ambient_colors(&mut self, ambient_colors: &[i32], interactive_colors: &[i32], anti_alias: bool) -> MethodId {
        let (method, mut body) = self.callback("onAmbientModeChanged", &["boolean"]);
        let interactive = body.new_label();
        let done = body.new_label();
        body.branch(body.param_local(0), CmpOp::Eq, 0, interactive);
        for color in ambient_colors {
            self.set_color(&mut body, *color);
        }
        if anti_alias {
            self.set_anti_alias(&mut body, true);
        }
        body.goto(done);
        body.bind(interactive);
        for color in interactive_colors {
            self.set_color(&mut body, *color);
        }
        body.bind(done);
        body.ret(None);
        self.finish_method(method, body);
        method
    }

    /// A service whose `onCreateEngine` returns this engine.
    pub fn service(&mut self) -> ClassId {
        let service = self.b.app_class(SERVICE, Some(self.fw.service_base));
        let create = self.b.method(service, "onCreateEngine", &[], ENGINE, false);
        let mut body = self.b.body_for(create);
        let engine = body.local("engine", ENGINE);
        body.new_object(engine, self.engine);
        body.ret(Some(engine.into()));
        self.b.set_body(create, body).unwrap();
        for name in ["onCreate", "onDestroy"] {
            let m = self.b.method(service, name, &[], "void", false);
            let mut body = self.b.body_for(m);
            body.ret(None);
            self.b.set_body(m, body).unwrap();
        }
        service
    }

    pub fn finish(self) -> Program {
        self.b.finish().unwrap()
    }
}

/// Scenario 1: the ambient transition always unregisters.
pub fn balanced_face() -> Program {
    let mut face = Face::new();
    face.visibility_toggles_sensor();
    face.ambient_unregisters(false);
    face.finish()
}

/// Scenario 2: the ambient transition unregisters only on one path.
pub fn leaky_face() -> Program {
    let mut face = Face::new();
    face.visibility_toggles_sensor();
    face.ambient_unregisters(true);
    face.finish()
}
