//! Small bus client for exercising a running daemon from the shell.
//!
//! Sends one command, either as a `SysMeth` method call (prints the reply)
//! or as a `UISig` signal (fire and forget).

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dbus::blocking::Connection;
use dbus::Message;

use sysmgrd::bus::{
    dbus::encode_body, encode, Command, PayloadValue, INTERFACE_NAME, METHOD_NAME, OBJECT_PATH,
    SERVICE_NAME, UI_INTERFACE_NAME, UI_OBJECT_PATH, UI_SERVICE_NAME, UI_SIGNAL_NAME,
};

#[derive(Debug, Parser)]
#[command(about = "Send one command to the system manager", author, version)]
struct SendArgs {
    /// Opcode to invoke (accepts 0x-prefixed hex)
    #[arg(long, value_parser = parse_i32)]
    opcode: i32,

    /// Topic id
    #[arg(long, default_value_t = 1)]
    topic: i32,

    /// Component id string
    #[arg(long, default_value = "sysmgr-send")]
    component: String,

    /// Emit a UI signal instead of a method call
    #[arg(long, default_value_t = false)]
    signal: bool,

    /// String payload entry, KEY=VALUE (repeatable, order preserved)
    #[arg(long = "str", value_name = "KEY=VALUE")]
    str_entries: Vec<String>,

    /// Integer payload entry, KEY=VALUE (repeatable, order preserved)
    #[arg(long = "int", value_name = "KEY=VALUE")]
    int_entries: Vec<String>,

    /// Reply timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
}

fn parse_i32(raw: &str) -> Result<i32, String> {
    let parsed = match raw.strip_prefix("0x") {
        Some(hex) => i32::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|err| format!("invalid integer {raw:?}: {err}"))
}

fn split_entry(raw: &str) -> Result<(&str, &str)> {
    raw.split_once('=')
        .with_context(|| format!("payload entry {raw:?} is not KEY=VALUE"))
}

fn build_command(args: &SendArgs) -> Result<Command> {
    let mut cmd = Command::new(args.component.clone(), args.topic, args.opcode);
    for raw in &args.str_entries {
        let (key, value) = split_entry(raw)?;
        cmd = cmd.with_entry(key, PayloadValue::Str(value.to_string()));
    }
    for raw in &args.int_entries {
        let (key, value) = split_entry(raw)?;
        let value: i32 = value
            .parse()
            .with_context(|| format!("integer entry {raw:?}"))?;
        cmd = cmd.with_entry(key, PayloadValue::I32(value));
    }
    Ok(cmd)
}

fn main() -> Result<()> {
    let args = SendArgs::parse();
    let cmd = build_command(&args)?;
    let items = encode_body(&encode(&cmd)).context("encoding command body")?;

    let conn = Connection::new_system().context("connecting to the system bus")?;

    if args.signal {
        conn.request_name(UI_SERVICE_NAME, false, true, false)
            .context("claiming the UI bus name")?;
        let mut msg = Message::new_signal(UI_OBJECT_PATH, UI_INTERFACE_NAME, UI_SIGNAL_NAME)
            .map_err(|err| anyhow::anyhow!("building signal: {err}"))?;
        msg.append_items(&items);
        conn.channel()
            .send(msg)
            .map_err(|()| anyhow::anyhow!("bus connection lost"))?;
        println!("signal sent: opcode {:#x}", args.opcode);
        return Ok(());
    }

    let mut msg = Message::new_method_call(SERVICE_NAME, OBJECT_PATH, INTERFACE_NAME, METHOD_NAME)
        .map_err(|err| anyhow::anyhow!("building method call: {err}"))?;
    msg.append_items(&items);
    let reply = conn
        .channel()
        .send_with_reply_and_block(msg, Duration::from_millis(args.timeout_ms))
        .context("waiting for the daemon's reply")?;
    let text: String = reply.read1().context("reading the reply string")?;
    println!("{text}");
    Ok(())
}
