//! Minimal parser for packed RESP *requests* (arrays of bulk strings),
//! which is the only shape the client crate emits for commands and
//! pipelines.

/// Split a packed request buffer into commands, each a list of argument
/// byte strings.
pub fn parse_commands(input: &[u8]) -> Result<Vec<Vec<Vec<u8>>>, String> {
    let mut commands = Vec::new();
    let mut pos = 0;

    while pos < input.len() {
        let (args, next) = parse_command(input, pos)?;
        commands.push(args);
        pos = next;
    }

    Ok(commands)
}

fn read_line(input: &[u8], pos: usize) -> Result<(&[u8], usize), String> {
    let offset = input[pos..]
        .windows(2)
        .position(|window| window == b"\r\n")
        .ok_or_else(|| "missing CRLF".to_string())?;

    Ok((&input[pos..pos + offset], pos + offset + 2))
}

fn parse_usize(digits: &[u8], context: &str) -> Result<usize, String> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| format!("bad {} length", context))
}

fn parse_command(input: &[u8], pos: usize) -> Result<(Vec<Vec<u8>>, usize), String> {
    let (line, mut pos) = read_line(input, pos)?;
    let header = line
        .strip_prefix(b"*")
        .ok_or_else(|| "expected array header".to_string())?;
    let argc = parse_usize(header, "array")?;

    let mut args = Vec::with_capacity(argc);
    for _ in 0..argc {
        let (line, body_start) = read_line(input, pos)?;
        let header = line
            .strip_prefix(b"$")
            .ok_or_else(|| "expected bulk string header".to_string())?;
        let len = parse_usize(header, "bulk string")?;

        let body_end = body_start + len;
        if input.len() < body_end + 2 || &input[body_end..body_end + 2] != b"\r\n" {
            return Err("truncated bulk string".to_string());
        }

        args.push(input[body_start..body_end].to_vec());
        pos = body_end + 2;
    }

    Ok((args, pos))
}
