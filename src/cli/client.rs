use anyhow::{Result, anyhow};
use console::style;
use reqwest::Client;
use serde_json::{Value, json};
use tokio_stream::StreamExt;

use crate::core::terminal::{GuideSection, print_error, print_status, print_success, print_warn};

/// Flags that consume the following argument.
const VALUE_FLAGS: &[&str] = &[
    "--api-url",
    "--json",
    "--name",
    "--description",
    "--role",
    "--goal",
    "--backstory",
    "--agent",
    "--input",
    "--type",
    "--content",
    "--timestamp",
    "--started-at",
    "--completed-at",
];

pub async fn run_client_command(args: &[String], default_api_url: &str) -> Result<()> {
    let api_url = parse_string_flag(args, "--api-url").unwrap_or_else(|| default_api_url.to_string());
    let plan = build_request_plan(args)?;
    let client = Client::new();
    let url = format!("{}{}", api_url.trim_end_matches('/'), plan.path);

    if let Some(kind) = plan.stream {
        return follow_stream(&client, &url, kind).await;
    }

    let request = match plan.method {
        HttpMethod::Get => client.get(&url),
        HttpMethod::Post => client.post(&url),
        HttpMethod::Patch => client.patch(&url),
    };

    let request = if let Some(body) = &plan.body {
        request.json(body)
    } else {
        request
    };

    let resp = request.send().await?;
    let status = resp.status();
    let body = resp.json::<Value>().await?;
    let ok = body
        .get("success")
        .and_then(|v| v.as_bool())
        .unwrap_or(status.is_success());

    if !ok {
        let message = body
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("request failed");
        return Err(anyhow!("{} ({})", message, status));
    }

    print_success(&format!("{} {}", plan.method.as_str(), plan.path));
    GuideSection::new("Response")
        .text(&serde_json::to_string_pretty(&body)?)
        .print();
    println!();

    Ok(())
}

async fn follow_stream(client: &Client, url: &str, kind: StreamKind) -> Result<()> {
    let resp = client.get(url).send().await?;
    if !resp.status().is_success() {
        let status = resp.status();
        let message = resp
            .json::<Value>()
            .await
            .ok()
            .and_then(|b| b.get("error").and_then(|v| v.as_str()).map(str::to_string))
            .unwrap_or_else(|| "request failed".to_string());
        return Err(anyhow!("{} ({})", message, status));
    }

    let mut buffer = String::new();
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        buffer.push_str(&String::from_utf8_lossy(&chunk?));
        while let Some(pos) = buffer.find('\n') {
            let line: String = buffer.drain(..=pos).collect();
            let line = line.trim_end();
            match kind {
                StreamKind::LogFeed => {
                    if let Some(data) = line.strip_prefix("data:") {
                        println!("{}", data.trim_start());
                    }
                }
                StreamKind::RunEvents => {
                    if let Some(event) = parse_stream_event(line)
                        && render_run_event(&event)?
                    {
                        return Ok(());
                    }
                }
            }
        }
    }

    if kind == StreamKind::RunEvents {
        print_warn("stream ended before the run finished");
    }
    Ok(())
}

/// Prints one run event. `Ok(true)` once the run has completed.
fn render_run_event(event: &Value) -> Result<bool> {
    let event_type = event
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("event");
    match event_type {
        "output" => {
            let output = &event["output"];
            let kind = output["output_type"].as_str().unwrap_or("log");
            let content = output["content"].as_str().unwrap_or_default();
            let label = match kind {
                "result" => style(format!("[{}]", kind)).green().bold(),
                "error" => style(format!("[{}]", kind)).red().bold(),
                _ => style(format!("[{}]", kind)).dim(),
            };
            println!("{} {}", label, content);
        }
        "status_update" => {
            print_status("Status", event["status"].as_str().unwrap_or("unknown"));
        }
        "complete" => {
            print_success("run finished");
            if let Some(result) = event.get("final_result").and_then(|v| v.as_str()) {
                GuideSection::new("Final Result").text(result).print();
                println!();
            }
            return Ok(true);
        }
        "error" => {
            let msg = event["error"].as_str().unwrap_or("stream failed");
            print_error(msg);
            return Err(anyhow!("{}", msg));
        }
        _ => println!("{}", event),
    }
    Ok(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HttpMethod {
    Get,
    Post,
    Patch,
}

impl HttpMethod {
    fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    RunEvents,
    LogFeed,
}

#[derive(Debug, Clone, PartialEq)]
struct RequestPlan {
    method: HttpMethod,
    path: String,
    body: Option<Value>,
    stream: Option<StreamKind>,
}

impl RequestPlan {
    fn get(path: String) -> Self {
        Self {
            method: HttpMethod::Get,
            path,
            body: None,
            stream: None,
        }
    }

    fn with_body(method: HttpMethod, path: String, body: Value) -> Self {
        Self {
            method,
            path,
            body: Some(body),
            stream: None,
        }
    }

    fn stream(path: String, kind: StreamKind) -> Self {
        Self {
            method: HttpMethod::Get,
            path,
            body: None,
            stream: Some(kind),
        }
    }
}

fn parse_string_flag(args: &[String], flag: &str) -> Option<String> {
    let mut i = 2;
    while i < args.len() {
        if args[i] == flag {
            if i + 1 < args.len() {
                return Some(args[i + 1].clone());
            }
            return None;
        }
        i += 1;
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().skip(2).any(|a| a == flag)
}

fn parse_positional_args(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = 3;
    while i < args.len() {
        let arg = args[i].as_str();
        if VALUE_FLAGS.contains(&arg) {
            i += 2;
        } else if arg.starts_with("--") {
            i += 1;
        } else {
            out.push(args[i].clone());
            i += 1;
        }
    }
    out
}

fn parse_json_flag(args: &[String]) -> Result<Value> {
    match parse_string_flag(args, "--json") {
        Some(raw) => {
            let parsed: Value = serde_json::from_str(&raw)
                .map_err(|e| anyhow!("invalid JSON for --json payload: {}", e))?;
            if !parsed.is_object() {
                return Err(anyhow!("--json payload must be a JSON object"));
            }
            Ok(parsed)
        }
        None => Ok(json!({})),
    }
}

/// Starts from `--json` and lets individual flags override its fields.
fn body_from_flags(args: &[String], fields: &[(&str, &str)]) -> Result<Value> {
    let mut body = parse_json_flag(args)?;
    let obj = body
        .as_object_mut()
        .ok_or_else(|| anyhow!("invalid payload object"))?;
    for (flag, field) in fields {
        if let Some(value) = parse_string_flag(args, flag) {
            obj.insert(field.to_string(), nullable(&value));
        }
    }
    Ok(body)
}

/// The literal `null` clears a field.
fn nullable(value: &str) -> Value {
    if value == "null" {
        Value::Null
    } else {
        Value::String(value.to_string())
    }
}

fn parse_id(raw: Option<&String>, what: &str) -> Result<i64> {
    let raw = raw.ok_or_else(|| anyhow!("{} requires <id>", what))?;
    raw.parse()
        .map_err(|_| anyhow!("{}: '{}' is not a numeric id", what, raw))
}

fn build_request_plan(args: &[String]) -> Result<RequestPlan> {
    let group = args
        .get(1)
        .map(|s| s.to_lowercase())
        .ok_or_else(|| anyhow!("missing command"))?;
    let action = args.get(2).map(|s| s.to_lowercase()).unwrap_or_default();
    let positional = parse_positional_args(args);

    match group.as_str() {
        "health" => Ok(RequestPlan::get("/api/health".to_string())),
        "logs" => Ok(RequestPlan::stream("/api/logs".to_string(), StreamKind::LogFeed)),
        "agents" | "agent" => match action.as_str() {
            "list" | "ls" | "" => {
                let path = if has_flag(args, "--all") {
                    "/api/agents?include_inactive=true"
                } else {
                    "/api/agents"
                };
                Ok(RequestPlan::get(path.to_string()))
            }
            "get" | "show" => {
                let id = parse_id(positional.first(), "agents get")?;
                Ok(RequestPlan::get(format!("/api/agents/{}", id)))
            }
            "create" | "add" => {
                let body = body_from_flags(
                    args,
                    &[
                        ("--name", "name"),
                        ("--description", "description"),
                        ("--role", "role"),
                        ("--goal", "goal"),
                        ("--backstory", "backstory"),
                    ],
                )?;
                Ok(RequestPlan::with_body(
                    HttpMethod::Post,
                    "/api/agents".to_string(),
                    body,
                ))
            }
            "update" | "patch" => {
                let id = parse_id(positional.first(), "agents update")?;
                let body = body_from_flags(
                    args,
                    &[
                        ("--name", "name"),
                        ("--description", "description"),
                        ("--role", "role"),
                        ("--goal", "goal"),
                        ("--backstory", "backstory"),
                    ],
                )?;
                Ok(RequestPlan::with_body(
                    HttpMethod::Patch,
                    format!("/api/agents/{}", id),
                    body,
                ))
            }
            "activate" | "deactivate" => {
                let id = parse_id(positional.first(), "agents activate")?;
                Ok(RequestPlan::with_body(
                    HttpMethod::Patch,
                    format!("/api/agents/{}", id),
                    json!({ "is_active": action == "activate" }),
                ))
            }
            _ => Err(anyhow!("Unsupported agents action '{}'", action)),
        },
        "runs" | "run" => match action.as_str() {
            "list" | "ls" | "" => match parse_string_flag(args, "--agent") {
                Some(agent) => {
                    let id = parse_id(Some(&agent), "runs list --agent")?;
                    Ok(RequestPlan::get(format!("/api/runs?agent_id={}", id)))
                }
                None => Ok(RequestPlan::get("/api/runs".to_string())),
            },
            "start" => {
                let agent_id = parse_id(positional.first(), "runs start")?;
                let input = parse_string_flag(args, "--input")
                    .or_else(|| positional.get(1).cloned())
                    .ok_or_else(|| anyhow!("runs start requires --input <text>"))?;
                Ok(RequestPlan::with_body(
                    HttpMethod::Post,
                    "/api/runs".to_string(),
                    json!({ "agent_id": agent_id, "input_text": input }),
                ))
            }
            "get" | "show" => {
                let id = parse_id(positional.first(), "runs get")?;
                Ok(RequestPlan::get(format!("/api/runs/{}", id)))
            }
            "status" => {
                let id = parse_id(positional.first(), "runs status")?;
                let status = positional
                    .get(1)
                    .ok_or_else(|| anyhow!("runs status requires <status>"))?;
                let mut body = body_from_flags(
                    args,
                    &[
                        ("--started-at", "started_at"),
                        ("--completed-at", "completed_at"),
                    ],
                )?;
                body["status"] = Value::String(status.to_lowercase());
                Ok(RequestPlan::with_body(
                    HttpMethod::Patch,
                    format!("/api/runs/{}/status", id),
                    body,
                ))
            }
            "output" | "emit" => {
                let id = parse_id(positional.first(), "runs output")?;
                let mut body = body_from_flags(
                    args,
                    &[("--content", "content"), ("--timestamp", "timestamp")],
                )?;
                body["output_type"] = Value::String(
                    parse_string_flag(args, "--type").unwrap_or_else(|| "log".to_string()),
                );
                if body.get("content").is_none() {
                    return Err(anyhow!("runs output requires --content <text>"));
                }
                Ok(RequestPlan::with_body(
                    HttpMethod::Post,
                    format!("/api/runs/{}/outputs", id),
                    body,
                ))
            }
            "outputs" => {
                let id = parse_id(positional.first(), "runs outputs")?;
                Ok(RequestPlan::get(format!("/api/runs/{}/outputs", id)))
            }
            "watch" | "stream" | "follow" => {
                let id = parse_id(positional.first(), "runs watch")?;
                Ok(RequestPlan::stream(
                    format!("/api/runs/{}/stream", id),
                    StreamKind::RunEvents,
                ))
            }
            _ => Err(anyhow!("Unsupported runs action '{}'", action)),
        },
        _ => Err(anyhow!("Unsupported command '{}'", group)),
    }
}

fn parse_stream_event(line: &str) -> Option<Value> {
    if !line.starts_with("data:") {
        return None;
    }
    let payload = line.trim_start_matches("data:").trim();
    serde_json::from_str(payload).ok()
}
