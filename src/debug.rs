extern crate chrono_tz;
extern crate serde_json;
extern crate tiny_http;

use crate::board;
use crate::result;
use crate::scheduler::PollScheduler;
use crate::store::PollHealth;

#[derive(Debug, Serialize)]
struct HealthJson {
    running: bool,
    polling: bool,
    polling_cycle: Option<u64>,
    last_success_at: Option<String>,
    last_failure_at: Option<String>,
    last_error: Option<String>,
    consecutive_failures: u32,
}

#[derive(Debug, Serialize)]
struct ArrivalsJson {
    now: String,
    cycle: Option<u64>,
    fetched_at: Option<String>,
    directions: Vec<board::BoardRow>,
    health: HealthJson,
}

#[derive(Debug, PartialEq, Eq)]
struct Reply {
    status: u16,
    content_type: &'static str,
    body: String,
}

impl Reply {
    fn html(status: u16, body: String) -> Reply {
        return Reply{status: status, content_type: "text/html; charset=utf-8", body: body};
    }

    fn text(status: u16, body: &str) -> Reply {
        return Reply{status: status, content_type: "text/plain; charset=utf-8", body: body.to_string()};
    }
}

pub struct StatusServer {
    server: tiny_http::Server,
    scheduler: PollScheduler,
    timezone: chrono_tz::Tz,
}

pub fn bind(addr: &str, scheduler: PollScheduler, timezone: chrono_tz::Tz) -> result::TrackerResult<StatusServer> {
    let server = tiny_http::Server::http(addr)
        .map_err(|err| result::make_error(&format!("binding status server to {}: {}", addr, err)))?;
    return Ok(StatusServer{server: server, scheduler: scheduler, timezone: timezone});
}

impl StatusServer {
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        return self.server.server_addr().to_ip();
    }

    /// Serves requests until the process exits.
    pub fn run(self) {
        debug!("Running status HTTP server on {:?}", self.local_addr());
        for request in self.server.incoming_requests() {
            let reply = self.route(request.method(), request.url());
            debug!("{} {} -> {}", request.method(), request.url(), reply.status);

            let mut response = tiny_http::Response::from_string(reply.body)
                .with_status_code(reply.status);
            match tiny_http::Header::from_bytes(&b"Content-Type"[..], reply.content_type.as_bytes()) {
                Ok(header) => response = response.with_header(header),
                Err(_) => warn!("Bad content type {}", reply.content_type),
            }
            if let Err(err) = request.respond(response) {
                warn!("Error writing status response: {}", err);
            }
        }
    }

    fn route(&self, method: &tiny_http::Method, url: &str) -> Reply {
        let path = url.split('?').next().unwrap_or("");
        match (method, path) {
            (&tiny_http::Method::Get, "/") => return self.main_page(),
            (&tiny_http::Method::Get, "/arrivals.json") => return self.arrivals_json(),
            (&tiny_http::Method::Get, "/refresh") | (&tiny_http::Method::Post, "/refresh") => {
                if self.scheduler.trigger_poll_now() {
                    return Reply::text(202, "refresh started\n");
                }
                return Reply::text(409, "a poll is already in flight\n");
            },
            (&tiny_http::Method::Get, "/start") | (&tiny_http::Method::Post, "/start") => {
                self.scheduler.start();
                return self.running_reply();
            },
            (&tiny_http::Method::Get, "/stop") | (&tiny_http::Method::Post, "/stop") => {
                self.scheduler.stop();
                return self.running_reply();
            },
            (_, _) => return Reply::html(404, "<h1>404</h1><p>Not found!<p>".to_string()),
        }
    }

    fn running_reply(&self) -> Reply {
        return Reply::text(200, &format!("running: {}\n", self.scheduler.is_running()));
    }

    fn health_json(&self, health: &PollHealth) -> HealthJson {
        return HealthJson{
            running: self.scheduler.is_running(),
            polling: self.scheduler.is_polling(),
            polling_cycle: self.scheduler.polling_cycle(),
            last_success_at: health.last_success_at.map(|t| t.to_rfc3339()),
            last_failure_at: health.last_failure_at.map(|t| t.to_rfc3339()),
            last_error: health.last_error.clone(),
            consecutive_failures: health.consecutive_failures,
        };
    }

    fn arrivals_json(&self) -> Reply {
        let now = self.scheduler.clock().now();
        let store = self.scheduler.store();
        let snapshot = store.latest();
        let body = ArrivalsJson{
            now: now.to_rfc3339(),
            cycle: snapshot.as_ref().map(|s| s.cycle),
            fetched_at: snapshot.as_ref().map(|s| s.fetched_at.to_rfc3339()),
            directions: snapshot.as_ref()
                .map(|s| board::rows(s, now, self.timezone))
                .unwrap_or(vec![]),
            health: self.health_json(&store.health()),
        };

        match serde_json::to_string_pretty(&body) {
            Ok(json) => return Reply{status: 200, content_type: "application/json", body: json},
            Err(err) => {
                error!("Error serializing arrivals: {}", err);
                return Reply::text(500, "could not serialize arrivals\n");
            },
        }
    }

    fn main_page(&self) -> Reply {
        let now = self.scheduler.clock().now();
        let store = self.scheduler.store();
        let health = store.health();
        let snapshot = store.latest();

        let mut body = "<html><body><h1>Subway Tracker</h1>".to_string();
        body.push_str(&format!(
            "<pre>{}</pre>",
            escape_html(&board::render_text(snapshot.as_deref(), &health, now, self.timezone))));

        body.push_str("<div><h2>Poller</h2><ul>");
        body.push_str(&format!("<li>Running: {}</li>", self.scheduler.is_running()));
        if let Some(cycle) = self.scheduler.polling_cycle() {
            body.push_str(&format!("<li>Polling cycle {}</li>", cycle));
        }
        if let Some(at) = health.last_success_at {
            body.push_str(&format!("<li>Last success: {}</li>", at.with_timezone(&self.timezone).to_rfc3339()));
        }
        if let Some(at) = health.last_failure_at {
            body.push_str(&format!("<li>Last failure: {}</li>", at.with_timezone(&self.timezone).to_rfc3339()));
        }
        body.push_str(&format!("<li>Consecutive failures: {}</li>", health.consecutive_failures));
        body.push_str("</ul></div>");

        body.push_str("<div><a href='/start'>Start</a> | <a href='/stop'>Stop</a> | <a href='/refresh'>Refresh now</a> | <a href='/arrivals.json'>JSON</a></div>");
        body.push_str("</body></html>");
        return Reply::html(200, body);
    }
}

fn escape_html(s: &str) -> String {
    return s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;");
}
