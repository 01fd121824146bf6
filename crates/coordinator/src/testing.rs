//! Test doubles shared by the coordinator tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use camera_capture::{CameraError, FrameSource, ReplaySource, VideoFrame};
use dms::{DmsError, LandmarkModel, Landmarks, ModelLoader, Point};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// What the scripted model does on one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// Face with both eyes at this EAR
    Face(f32),
    /// Same face with the nose dropped half a face width
    Nod(f32),
    NoFace,
    Fail,
}

#[derive(Debug)]
struct ScriptState {
    queue: VecDeque<Step>,
    fallback: Step,
    fail_loads: bool,
    loads: u32,
}

/// Shared, mutable behaviour of scripted models
#[derive(Debug, Clone)]
pub struct ModelScript(Arc<Mutex<ScriptState>>);

impl ModelScript {
    pub fn new(fallback: Step) -> Self {
        Self(Arc::new(Mutex::new(ScriptState {
            queue: VecDeque::new(),
            fallback,
            fail_loads: false,
            loads: 0,
        })))
    }

    /// Queue `count` frames of `step` ahead of the fallback
    pub fn push(&self, step: Step, count: usize) {
        let mut state = self.0.lock().unwrap();
        state.queue.extend(std::iter::repeat(step).take(count));
    }

    pub fn set_fallback(&self, step: Step) {
        self.0.lock().unwrap().fallback = step;
    }

    pub fn fail_loads(&self, fail: bool) {
        self.0.lock().unwrap().fail_loads = fail;
    }

    pub fn loads(&self) -> u32 {
        self.0.lock().unwrap().loads
    }

    fn next(&self) -> Step {
        let mut state = self.0.lock().unwrap();
        let fallback = state.fallback;
        state.queue.pop_front().unwrap_or(fallback)
    }
}

pub struct ScriptedModel {
    script: ModelScript,
}

impl LandmarkModel for ScriptedModel {
    fn detect(&mut self, _frame: &VideoFrame) -> Result<Option<Landmarks>, DmsError> {
        match self.script.next() {
            Step::Face(ear) => Ok(Some(synthetic_face(ear))),
            Step::Nod(ear) => Ok(Some(face_with_nose(ear, LEVEL_NOSE + 100.0))),
            Step::NoFace => Ok(None),
            Step::Fail => Err(DmsError::Inference("scripted failure".into())),
        }
    }
}

pub struct ScriptedLoader {
    script: ModelScript,
}

impl ScriptedLoader {
    pub fn new(script: ModelScript) -> Self {
        Self { script }
    }
}

impl ModelLoader for ScriptedLoader {
    fn load(&self, _model_path: &str) -> Result<Box<dyn LandmarkModel>, DmsError> {
        let mut state = self.script.0.lock().unwrap();
        if state.fail_loads {
            return Err(DmsError::ModelLoad("scripted load failure".into()));
        }
        state.loads += 1;
        Ok(Box::new(ScriptedModel {
            script: self.script.clone(),
        }))
    }
}

const LEVEL_NOSE: f32 = 210.0;

/// 68-point face, 200px wide, eyes 40px wide at the given EAR
pub fn synthetic_face(ear: f32) -> Landmarks {
    face_with_nose(ear, LEVEL_NOSE)
}

fn face_with_nose(ear: f32, nose_y: f32) -> Landmarks {
    let mut points = vec![Point::new(200.0, 200.0); 68];
    for (i, point) in points.iter_mut().take(17).enumerate() {
        let t = i as f32 / 16.0;
        *point = Point::new(100.0 + 200.0 * t, 300.0 - 150.0 * (2.0 * t - 1.0).abs());
    }
    for point in &mut points[27..36] {
        *point = Point::new(200.0, nose_y);
    }
    place_eye(&mut points[36..42], 150.0, ear);
    place_eye(&mut points[42..48], 250.0, ear);
    Landmarks::new(points)
}

fn place_eye(eye: &mut [Point], cx: f32, ear: f32) {
    let half = ear * 40.0 / 2.0;
    eye[0] = Point::new(cx - 20.0, 150.0);
    eye[1] = Point::new(cx - 7.0, 150.0 - half);
    eye[2] = Point::new(cx + 7.0, 150.0 - half);
    eye[3] = Point::new(cx + 20.0, 150.0);
    eye[4] = Point::new(cx + 7.0, 150.0 + half);
    eye[5] = Point::new(cx - 7.0, 150.0 + half);
}

/// Camera handle the test keeps after handing a clone to the coordinator
#[derive(Clone)]
pub struct SharedCamera(Arc<Mutex<ReplaySource>>);

impl SharedCamera {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(ReplaySource::blank(64, 48, 4))))
    }

    pub fn boxed(&self) -> Box<dyn FrameSource> {
        Box::new(self.clone())
    }

    pub fn open_count(&self) -> u32 {
        self.0.lock().unwrap().open_count()
    }

    pub fn release_count(&self) -> u32 {
        self.0.lock().unwrap().release_count()
    }

    pub fn is_held(&self) -> bool {
        self.0.lock().unwrap().is_open()
    }
}

impl FrameSource for SharedCamera {
    fn open(&mut self) -> Result<(), CameraError> {
        self.0.lock().unwrap().open()
    }

    fn next_frame(&mut self) -> Result<VideoFrame, CameraError> {
        self.0.lock().unwrap().next_frame()
    }

    fn release(&mut self) {
        self.0.lock().unwrap().release()
    }

    fn is_open(&self) -> bool {
        self.0.lock().unwrap().is_open()
    }
}

pub async fn mount_online(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "online",
            "components": {"drowsiness_detector": "active"}
        })))
        .mount(server)
        .await;
}

pub fn drowsiness_body(level: u8, alert_status: &str) -> Value {
    json!({
        "ear_value": 0.24,
        "is_drowsy": level > 70,
        "blink_count": 9,
        "yawn_count": 1,
        "head_pose": {"x": 1.0, "y": 2.0, "z": 3.0},
        "drowsiness_level": level,
        "alert_status": alert_status,
        "timestamp": "2024-05-01T12:00:00Z"
    })
}
