// tests/common/mod.rs
//
// A stand-in for the judge service and the push service, on one actix-web
// server: REST endpoints under /api/v1 and a WebSocket at /socket.

#![allow(dead_code)]

use actix::{Actor, ActorContext, Addr, AsyncContext, Handler, Message, StreamHandler};
use actix_web::dev::ServerHandle;
use actix_web::http::StatusCode;
use actix_web::{App, Error, HttpRequest, HttpResponse, HttpServer, web};
use actix_web_actors::ws;
use codepad::config::{AppConfig, ReconnectPolicy};
use codepad::state::{SubmissionStateProjector, WorkspaceState};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Message, Clone)]
#[rtype(result = "()")]
struct Push(String);

#[derive(Message)]
#[rtype(result = "()")]
struct Kick;

/// Tracks which socket belongs to which user, like the real push service:
/// a later `setUserId` for the same user replaces the earlier binding.
#[derive(Clone, Default)]
pub struct PushBroker {
    bindings: Arc<Mutex<HashMap<String, Addr<PushConnection>>>>,
    announcements: Arc<Mutex<Vec<String>>>,
    events: Arc<Mutex<Vec<(String, Value)>>>,
    arrivals: Arc<Mutex<Vec<String>>>,
}

impl PushBroker {
    fn bind(&self, user: String, addr: Addr<PushConnection>) {
        self.announcements.lock().unwrap().push(user.clone());
        self.arrivals.lock().unwrap().push("setUserId".to_string());
        self.bindings.lock().unwrap().insert(user, addr);
    }

    fn unbind(&self, addr: &Addr<PushConnection>) {
        self.bindings.lock().unwrap().retain(|_, bound| *bound != *addr);
    }

    pub fn announcements(&self) -> Vec<String> {
        self.announcements.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().unwrap().clone()
    }

    /// Names of every frame received, announcements included, in order.
    pub fn arrivals(&self) -> Vec<String> {
        self.arrivals.lock().unwrap().clone()
    }

    fn record_event(&self, event: String, data: Value) {
        self.arrivals.lock().unwrap().push(event.clone());
        self.events.lock().unwrap().push((event, data));
    }

    pub fn is_bound(&self, user: &str) -> bool {
        self.bindings.lock().unwrap().contains_key(user)
    }

    /// Sends a `submissionPayloadResponse` to the user's socket.
    pub fn push_result(&self, user: &str, payload: Value) -> bool {
        let frame = json!(["submissionPayloadResponse", payload]).to_string();
        match self.bindings.lock().unwrap().get(user) {
            Some(addr) => {
                addr.do_send(Push(frame));
                true
            }
            None => false,
        }
    }

    /// Closes the user's socket from the server side.
    pub fn kick(&self, user: &str) -> bool {
        match self.bindings.lock().unwrap().get(user) {
            Some(addr) => {
                addr.do_send(Kick);
                true
            }
            None => false,
        }
    }

    pub async fn wait_for_announcements(&self, count: usize) -> bool {
        eventually(|| self.announcements.lock().unwrap().len() >= count).await
    }

    pub async fn wait_for_event(&self, name: &str) -> bool {
        eventually(|| self.events.lock().unwrap().iter().any(|(event, _)| event == name)).await
    }
}

pub struct PushConnection {
    broker: PushBroker,
}

impl Actor for PushConnection {
    type Context = ws::WebsocketContext<Self>;

    fn stopped(&mut self, ctx: &mut Self::Context) {
        self.broker.unbind(&ctx.address());
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for PushConnection {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Text(text)) => {
                let Ok(Value::Array(parts)) = serde_json::from_str::<Value>(&text) else {
                    return;
                };
                match (parts.first(), parts.get(1)) {
                    (Some(Value::String(event)), Some(Value::String(user))) if event == "setUserId" => {
                        self.broker.bind(user.clone(), ctx.address());
                    }
                    (Some(Value::String(event)), data) => {
                        self.broker
                            .record_event(event.clone(), data.cloned().unwrap_or(Value::Null));
                    }
                    _ => (),
                }
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            _ => (),
        }
    }
}

impl Handler<Push> for PushConnection {
    type Result = ();

    fn handle(&mut self, msg: Push, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl Handler<Kick> for PushConnection {
    type Result = ();

    fn handle(&mut self, _: Kick, ctx: &mut Self::Context) {
        ctx.close(None);
        ctx.stop();
    }
}

/// What the fake judge has received, and how it should answer.
#[derive(Clone, Default)]
pub struct JudgeState {
    submissions: Arc<Mutex<Vec<Value>>>,
    reject_with: Arc<Mutex<Option<u16>>>,
}

impl JudgeState {
    pub fn submissions(&self) -> Vec<Value> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn reject_with(&self, status: u16) {
        *self.reject_with.lock().unwrap() = Some(status);
    }
}

async fn submit(judge: web::Data<JudgeState>, body: web::Json<Value>) -> HttpResponse {
    judge.submissions.lock().unwrap().push(body.into_inner());
    let rejection = *judge.reject_with.lock().unwrap();
    match rejection {
        Some(status) => HttpResponse::build(StatusCode::from_u16(status).unwrap()).body("judge queue is full"),
        None => HttpResponse::Created().json(json!({ "message": "Submission received" })),
    }
}

async fn list_problems() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "data": [
            { "_id": "p1", "title": "Print One", "difficulty": "easy" },
            { "_id": "p2", "title": "Two Sum", "difficulty": "medium" }
        ]
    }))
}

async fn get_problem(path: web::Path<String>) -> HttpResponse {
    let id = path.into_inner();
    if id != "p1" {
        return HttpResponse::NotFound().json(json!({ "message": "Problem not found" }));
    }
    HttpResponse::Ok().json(json!({
        "data": {
            "description": "# Print One\nPrint the number `1`.",
            "defaultCode": "print()",
            "testCases": [{ "input": "", "output": "1" }]
        }
    }))
}

async fn push_socket(
    req: HttpRequest,
    stream: web::Payload,
    broker: web::Data<PushBroker>,
) -> Result<HttpResponse, Error> {
    let conn = PushConnection {
        broker: broker.get_ref().clone(),
    };
    ws::start(conn, &req, stream)
}

pub struct FakeServices {
    pub http_base: String,
    pub socket_url: String,
    pub broker: PushBroker,
    pub judge: JudgeState,
    handle: ServerHandle,
}

impl FakeServices {
    /// Must be called from inside an actix runtime (`#[actix_web::test]`).
    pub fn start() -> Self {
        let broker = PushBroker::default();
        let judge = JudgeState::default();

        let app_broker = broker.clone();
        let app_judge = judge.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(app_broker.clone()))
                .app_data(web::Data::new(app_judge.clone()))
                .service(
                    web::scope("/api/v1")
                        .route("/problems", web::get().to(list_problems))
                        .route("/problems/{id}", web::get().to(get_problem))
                        .route("/submissions", web::post().to(submit)),
                )
                .route("/socket", web::get().to(push_socket))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .expect("bind fake services");

        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_rt::spawn(server);

        Self {
            http_base: format!("http://{addr}/api/v1"),
            socket_url: format!("ws://{addr}/socket"),
            broker,
            judge,
            handle,
        }
    }

    pub fn config(&self, user_id: &str) -> AppConfig {
        AppConfig {
            problems_api_base: self.http_base.clone(),
            submissions_api_base: self.http_base.clone(),
            socket_url: self.socket_url.clone(),
            user_id: user_id.to_string(),
            request_timeout: Duration::from_secs(5),
            result_timeout: Duration::from_secs(5),
            reconnect: ReconnectPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(50),
                max_delay: Duration::from_millis(200),
            },
        }
    }

    pub async fn stop(self) {
        self.handle.stop(false).await;
    }
}

/// An http base nothing is listening on.
pub fn dead_http_base() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/api/v1")
}

#[derive(Default)]
pub struct RecordingProjector {
    pub states: Mutex<Vec<WorkspaceState>>,
}

impl SubmissionStateProjector for RecordingProjector {
    fn project(&self, state: &WorkspaceState) {
        self.states.lock().unwrap().push(state.clone());
    }
}

pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
