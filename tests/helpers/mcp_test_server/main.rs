//! MCP test server binary for integration tests
//!
//! A minimal MCP server speaking newline-delimited JSON-RPC over
//! stdin/stdout. Integration tests launch it through `StdioSession` to
//! exercise the relay against a real child process.
//!
//! # Tools
//!
//! - `echo` -- returns `arguments.message` as text
//! - `read_file` -- returns the contents of `arguments.path`, or an
//!   `isError` result when the file cannot be read
//! - `fail` -- always answers with a JSON-RPC error
//! - any name passed with `--tool <name>` -- returns `"<name> from <server>"`
//!
//! # Flags
//!
//! - `--name <server>` -- server name used in tool output (default `test`)
//! - `--tool <name>` -- advertise an extra tool (repeatable)
//! - `--page-size <n>` -- split `tools/list` into pages of `n` tools
//! - `--fail-initialize` -- print a line to stderr and exit before answering
//! - `--exit-after-initialize` -- exit once the handshake has completed
//! - `--pid-file <path>` -- write the process id to `path` on startup

use std::io::{self, BufRead, Write};

use serde_json::{json, Value};

struct Options {
    name: String,
    extra_tools: Vec<String>,
    page_size: Option<usize>,
    fail_initialize: bool,
    exit_after_initialize: bool,
    pid_file: Option<String>,
}

fn parse_options() -> Options {
    let mut options = Options {
        name: "test".to_string(),
        extra_tools: Vec::new(),
        page_size: None,
        fail_initialize: false,
        exit_after_initialize: false,
        pid_file: None,
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--name" => {
                if let Some(v) = args.next() {
                    options.name = v;
                }
            }
            "--tool" => {
                if let Some(v) = args.next() {
                    options.extra_tools.push(v);
                }
            }
            "--page-size" => {
                options.page_size = args.next().and_then(|v| v.parse().ok()).filter(|n| *n > 0);
            }
            "--fail-initialize" => options.fail_initialize = true,
            "--exit-after-initialize" => options.exit_after_initialize = true,
            "--pid-file" => options.pid_file = args.next(),
            other => eprintln!("mcp_test_server: ignoring unknown argument {}", other),
        }
    }
    options
}

fn main() {
    let options = parse_options();
    if let Some(path) = &options.pid_file {
        if let Err(e) = std::fs::write(path, std::process::id().to_string()) {
            eprintln!("mcp_test_server: cannot write pid file {}: {}", path, e);
            std::process::exit(1);
        }
    }
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Value>(trimmed) {
            Ok(request) => {
                let method = request.get("method").and_then(Value::as_str).unwrap_or("");
                // Notifications get no reply.
                if request.get("id").is_none() {
                    if method == "notifications/initialized" && options.exit_after_initialize {
                        eprintln!("mcp_test_server: exiting after handshake");
                        std::process::exit(0);
                    }
                    continue;
                }
                let id = request.get("id").cloned().unwrap_or(Value::Null);
                let params = request.get("params").cloned().unwrap_or(Value::Null);

                if method == "initialize" && options.fail_initialize {
                    eprintln!("mcp_test_server: refusing to initialize");
                    std::process::exit(1);
                }

                match method {
                    "initialize" => reply(&id, initialize_result(&options)),
                    "tools/list" => reply(&id, tools_list_result(&options, &params)),
                    "tools/call" => tools_call(&options, &id, &params),
                    "ping" => reply(&id, json!({})),
                    _ => error(&id, -32601, &format!("Method not found: {}", method)),
                }
            }
            Err(_) => error(&Value::Null, -32700, "Parse error"),
        };

        if writeln!(out, "{}", response).is_err() || out.flush().is_err() {
            break;
        }
    }
}

fn initialize_result(options: &Options) -> Value {
    json!({
        "protocolVersion": "2025-06-18",
        "capabilities": { "tools": {} },
        "serverInfo": { "name": options.name, "version": "0.1.0" }
    })
}

fn all_tools(options: &Options) -> Vec<Value> {
    let mut tools = vec![
        json!({
            "name": "echo",
            "description": "Echoes the message argument",
            "inputSchema": {
                "type": "object",
                "properties": { "message": { "type": "string" } },
                "required": ["message"]
            }
        }),
        json!({
            "name": "read_file",
            "description": "Reads a file from disk",
            "inputSchema": {
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": ["path"]
            }
        }),
        json!({
            "name": "fail",
            "description": "Always fails",
            "inputSchema": { "type": "object" }
        }),
    ];
    for name in &options.extra_tools {
        tools.push(json!({
            "name": name,
            "title": format!("{} on {}", name, options.name),
            "inputSchema": { "type": "object" }
        }));
    }
    tools
}

fn tools_list_result(options: &Options, params: &Value) -> Value {
    let tools = all_tools(options);
    let Some(page_size) = options.page_size else {
        return json!({ "tools": tools });
    };

    let start = params
        .get("cursor")
        .and_then(Value::as_str)
        .and_then(|c| c.parse::<usize>().ok())
        .unwrap_or(0)
        .min(tools.len());
    let end = (start + page_size).min(tools.len());
    let mut result = json!({ "tools": tools[start..end].to_vec() });
    if end < tools.len() {
        result["nextCursor"] = json!(end.to_string());
    }
    result
}

fn tools_call(options: &Options, id: &Value, params: &Value) -> Value {
    let name = params.get("name").and_then(Value::as_str).unwrap_or("");
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

    match name {
        "echo" => {
            let message = arguments
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("");
            reply(id, text_result(message, false))
        }
        "read_file" => {
            let path = arguments.get("path").and_then(Value::as_str).unwrap_or("");
            match std::fs::read_to_string(path) {
                Ok(contents) => reply(id, text_result(&contents, false)),
                Err(e) => reply(id, text_result(&format!("cannot read {}: {}", path, e), true)),
            }
        }
        "fail" => error(id, -32000, "fail tool always fails"),
        other if options.extra_tools.iter().any(|t| t == other) => {
            reply(id, text_result(&format!("{} from {}", other, options.name), false))
        }
        other => error(id, -32602, &format!("Unknown tool: {}", other)),
    }
}

fn text_result(text: &str, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error
    })
}

fn reply(id: &Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error(id: &Value, code: i32, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}
