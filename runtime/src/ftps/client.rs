//! FTP command layer: login, passive data channels, `LIST` and `RETR`.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, error, info, warn};

use super::transport::{SecureLayer, Transport};
use super::{TransferError, TransferResult, IMPLICIT_FTPS_PORT};

/// Connection settings for [`FtpsClient`].
#[derive(Debug, Clone)]
pub struct FtpsOptions {
    /// Port used when a transfer URL names none.
    pub default_port: u16,
    /// Socket connect/read/write timeout.
    pub timeout: Duration,
    pub user: String,
    pub password: String,
}

impl Default for FtpsOptions {
    fn default() -> Self {
        Self {
            default_port: IMPLICIT_FTPS_PORT,
            timeout: Duration::from_secs(300),
            user: "anonymous".to_string(),
            password: "anonymous@".to_string(),
        }
    }
}

/// One parsed server reply. Multi-line replies keep only the final line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Reply {
    code: u16,
    message: String,
}

impl Reply {
    fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    fn is_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

struct Control {
    host: String,
    port: u16,
    stream: BufReader<Box<dyn Transport>>,
}

/// Blocking FTP client over a pluggable [`SecureLayer`].
///
/// Holds at most one control connection. Transfers are sequential and use
/// one passive data channel at a time.
pub struct FtpsClient {
    layer: Arc<dyn SecureLayer>,
    options: FtpsOptions,
    control: Option<Control>,
}

impl FtpsClient {
    pub fn new(layer: Arc<dyn SecureLayer>, options: FtpsOptions) -> Self {
        Self {
            layer,
            options,
            control: None,
        }
    }

    pub fn options(&self) -> &FtpsOptions {
        &self.options
    }

    /// Host of the current control connection, if any.
    pub fn connected_host(&self) -> Option<&str> {
        self.control.as_ref().map(|c| c.host.as_str())
    }

    /// Host and port of the current control connection, if any.
    pub fn connected_endpoint(&self) -> Option<(&str, u16)> {
        self.control.as_ref().map(|c| (c.host.as_str(), c.port))
    }

    /// Open and authenticate a control connection. Failures are logged and
    /// reported as `false`.
    pub fn connect(&mut self, host: &str, port: u16) -> bool {
        info!("connecting to {host}:{port}");
        match self.try_connect(host, port) {
            Ok(()) => {
                info!("connected to {host}:{port}");
                true
            }
            Err(e) => {
                error!("connection to {host}:{port} failed: {e}");
                false
            }
        }
    }

    pub fn try_connect(&mut self, host: &str, port: u16) -> TransferResult<()> {
        self.disconnect();

        let tcp = self.open_socket(host, port)?;
        let transport = self.layer.wrap(host, tcp)?;
        self.control = Some(Control {
            host: host.to_string(),
            port,
            stream: BufReader::new(transport),
        });

        let result = self.login();
        if result.is_err() {
            self.control = None;
        }
        result
    }

    fn login(&mut self) -> TransferResult<()> {
        let greeting = self.read_reply()?;
        if !greeting.is_completion() {
            return Err(unexpected("greeting", greeting));
        }
        debug!("server greeting: {}", greeting.message);

        let user = format!("USER {}", self.options.user);
        let reply = self.command(&user)?;
        if reply.code == 331 {
            let pass = format!("PASS {}", self.options.password);
            self.expect(&pass, |r| r.is_completion())?;
        } else if !reply.is_completion() {
            return Err(unexpected("USER", reply));
        }

        if self.layer.is_secure() {
            for cmd in ["PBSZ 0", "PROT P"] {
                let reply = self.command(cmd)?;
                if !reply.is_completion() {
                    warn!("server rejected {cmd}: {} {}", reply.code, reply.message);
                }
            }
        }

        self.expect("TYPE I", |r| r.is_completion())?;
        Ok(())
    }

    /// Send `QUIT` and drop the control connection. Errors are ignored.
    pub fn disconnect(&mut self) {
        if self.control.is_none() {
            return;
        }
        let _ = self.command("QUIT");
        if let Some(mut control) = self.control.take() {
            let _ = control.stream.get_mut().shutdown();
            debug!("disconnected from {}:{}", control.host, control.port);
        }
    }

    /// File names in `remote_path`. Failures are logged and yield an empty
    /// list.
    pub fn list(&mut self, remote_path: &str) -> Vec<String> {
        match self.try_list(remote_path) {
            Ok(names) => names,
            Err(e) => {
                error!("listing {remote_path} failed: {e}");
                Vec::new()
            }
        }
    }

    pub fn try_list(&mut self, remote_path: &str) -> TransferResult<Vec<String>> {
        self.expect(&format!("CWD {remote_path}"), |r| r.is_completion())?;

        let mut data = self.open_data_channel("LIST")?;
        let mut raw = Vec::new();
        let read = data.read_to_end(&mut raw);
        let _ = data.shutdown();
        drop(data);
        let finished = self.finish_transfer("LIST");
        read?;
        finished?;

        let names: Vec<String> = String::from_utf8_lossy(&raw)
            .lines()
            .filter_map(parse_list_line)
            .collect();
        debug!("{remote_path}: {} entries", names.len());
        Ok(names)
    }

    /// Retrieve `remote_path/filename` into `local_dir`. An existing local
    /// file counts as success without touching the network.
    pub fn download_file(&mut self, remote_path: &str, filename: &str, local_dir: &Path) -> bool {
        let target = local_dir.join(filename);
        if target.exists() {
            debug!("already present: {}", target.display());
            return true;
        }
        match self.try_download(remote_path, filename, local_dir) {
            Ok(bytes) => {
                debug!("downloaded {filename} ({bytes} bytes)");
                true
            }
            Err(e) => {
                error!("download of {filename} failed: {e}");
                false
            }
        }
    }

    /// Stream one file to `<local_dir>/<filename>.part` and rename it into
    /// place once the server confirms the transfer. Returns bytes written.
    pub fn try_download(
        &mut self,
        remote_path: &str,
        filename: &str,
        local_dir: &Path,
    ) -> TransferResult<u64> {
        std::fs::create_dir_all(local_dir)?;
        let target = local_dir.join(filename);
        let partial = local_dir.join(format!("{filename}.part"));

        let result = self.retrieve(remote_path, filename, &partial);
        match result {
            Ok(bytes) => {
                std::fs::rename(&partial, &target)?;
                Ok(bytes)
            }
            Err(e) => {
                let _ = std::fs::remove_file(&partial);
                Err(e)
            }
        }
    }

    fn retrieve(&mut self, remote_path: &str, filename: &str, partial: &Path) -> TransferResult<u64> {
        self.expect(&format!("CWD {remote_path}"), |r| r.is_completion())?;
        self.expect("TYPE I", |r| r.is_completion())?;

        let mut file = File::create(partial)?;
        let mut data = self.open_data_channel(&format!("RETR {filename}"))?;
        let copied = io::copy(&mut data, &mut file);
        let _ = data.shutdown();
        drop(data);
        // The final reply is read even after a failed copy so the control
        // channel stays in step.
        let finished = self.finish_transfer("RETR");
        let bytes = copied?;
        finished?;
        file.flush()?;
        Ok(bytes)
    }

    /// Enter passive mode, connect the data socket, send `command` and wait
    /// for the preliminary reply before wrapping the socket. Servers only
    /// start their side of the data handshake after that reply.
    fn open_data_channel(&mut self, command: &str) -> TransferResult<Box<dyn Transport>> {
        let reply = self.expect("PASV", |r| r.code == 227)?;
        let port = parse_pasv_port(&reply.message)?;
        let host = self.control()?.host.clone();
        // Data goes to the control host; the advertised address is often a
        // private one behind NAT.
        let tcp = self.open_socket(&host, port)?;

        let reply = self.command(command)?;
        if !reply.is_preliminary() {
            return Err(unexpected(command, reply));
        }
        match self.layer.wrap(&host, tcp) {
            Ok(transport) => Ok(transport),
            Err(e) => {
                let _ = self.read_reply();
                Err(e)
            }
        }
    }

    fn finish_transfer(&mut self, command: &str) -> TransferResult<()> {
        let reply = self.read_reply()?;
        if reply.is_completion() {
            Ok(())
        } else {
            Err(unexpected(command, reply))
        }
    }

    fn open_socket(&self, host: &str, port: u16) -> TransferResult<TcpStream> {
        let timeout = self.options.timeout;
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(tcp) => {
                    tcp.set_read_timeout(Some(timeout))?;
                    tcp.set_write_timeout(Some(timeout))?;
                    return Ok(tcp);
                }
                Err(e) => last_err = Some(e),
            }
        }
        match last_err {
            Some(e) => Err(TransferError::Io(e)),
            None => Err(TransferError::ConnectFailed {
                host: host.to_string(),
                port,
            }),
        }
    }

    fn control(&mut self) -> TransferResult<&mut Control> {
        self.control.as_mut().ok_or(TransferError::NotConnected)
    }

    fn command(&mut self, command: &str) -> TransferResult<Reply> {
        if command.starts_with("PASS ") {
            debug!("> PASS ****");
        } else {
            debug!("> {command}");
        }
        let sent = self.send(command);
        self.check_control(sent)?;
        self.read_reply()
    }

    fn send(&mut self, command: &str) -> TransferResult<()> {
        let stream = self.control()?.stream.get_mut();
        stream.write_all(command.as_bytes())?;
        stream.write_all(b"\r\n")?;
        stream.flush()?;
        Ok(())
    }

    /// Forget the control connection once it has failed at the socket or TLS
    /// level, so the next transfer reconnects instead of talking to a dead
    /// stream.
    fn check_control<T>(&mut self, result: TransferResult<T>) -> TransferResult<T> {
        if let Err(e) = &result {
            if e.is_connection_lost() {
                if let Some(control) = self.control.take() {
                    warn!("control connection to {}:{} lost: {e}", control.host, control.port);
                }
            }
        }
        result
    }

    fn expect(&mut self, command: &str, accept: impl Fn(&Reply) -> bool) -> TransferResult<Reply> {
        let reply = self.command(command)?;
        if accept(&reply) {
            Ok(reply)
        } else {
            Err(unexpected(command, reply))
        }
    }

    fn read_reply(&mut self) -> TransferResult<Reply> {
        let reply = self.read_control_reply();
        self.check_control(reply)
    }

    fn read_control_reply(&mut self) -> TransferResult<Reply> {
        let control = self.control()?;
        let first = read_line(&mut control.stream)?;
        let code = reply_code(&first)?;

        let mut last = first;
        if last.as_bytes().get(3) == Some(&b'-') {
            let terminator = format!("{code} ");
            loop {
                let line = read_line(&mut control.stream)?;
                let done = line.starts_with(&terminator);
                last = line;
                if done {
                    break;
                }
            }
        }

        let message = last.get(4..).unwrap_or_default().trim().to_string();
        debug!("< {code} {message}");
        Ok(Reply { code, message })
    }
}

impl Drop for FtpsClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn unexpected(command: &str, reply: Reply) -> TransferError {
    // Never echo credentials back into logs.
    let command = command.split_whitespace().next().unwrap_or(command);
    TransferError::Reply {
        command: command.to_string(),
        code: reply.code,
        message: reply.message,
    }
}

fn read_line(stream: &mut BufReader<Box<dyn Transport>>) -> TransferResult<String> {
    let mut buf = Vec::new();
    if stream.read_until(b'\n', &mut buf)? == 0 {
        return Err(TransferError::Closed);
    }
    let line = String::from_utf8_lossy(&buf);
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn reply_code(line: &str) -> TransferResult<u16> {
    line.get(..3)
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or_else(|| TransferError::Malformed(line.to_string()))
}

fn parse_pasv_port(message: &str) -> TransferResult<u16> {
    static PASV: OnceLock<Regex> = OnceLock::new();
    let re = PASV.get_or_init(|| {
        Regex::new(r"(\d+),(\d+),(\d+),(\d+),(\d+),(\d+)").expect("valid regex")
    });
    let caps = re
        .captures(message)
        .ok_or_else(|| TransferError::Malformed(format!("PASV reply: {message}")))?;
    let octet = |i: usize| caps[i].parse::<u16>().ok().filter(|v| *v <= 255);
    match (octet(5), octet(6)) {
        (Some(hi), Some(lo)) => Ok(hi * 256 + lo),
        _ => Err(TransferError::Malformed(format!("PASV reply: {message}"))),
    }
}

/// File name from one Unix-style `LIST` line: everything after the eight
/// fixed fields, joined by single spaces. Short lines and `.`/`..` yield
/// `None`.
pub fn parse_list_line(line: &str) -> Option<String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 9 {
        return None;
    }
    let name = parts[8..].join(" ");
    if name == "." || name == ".." {
        return None;
    }
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_line() {
        assert_eq!(
            parse_list_line("-rw-r--r--   1 ftp ftp  10240 Oct 13 09:00 I100001.xml"),
            Some("I100001.xml".to_string())
        );
        assert_eq!(
            parse_list_line("-rw-r--r-- 1 ftp ftp 1 Oct 13 2025 name  with   spaces.xml"),
            Some("name with spaces.xml".to_string())
        );
        assert_eq!(parse_list_line("drwxr-xr-x 2 ftp ftp 4096 Oct 13 09:00 ."), None);
        assert_eq!(parse_list_line("drwxr-xr-x 2 ftp ftp 4096 Oct 13 09:00 .."), None);
        assert_eq!(parse_list_line("total 12"), None);
        assert_eq!(parse_list_line(""), None);
    }

    #[test]
    fn test_parse_pasv_port() {
        assert_eq!(
            parse_pasv_port("Entering Passive Mode (10,0,0,5,195,80).").unwrap(),
            195 * 256 + 80
        );
        assert!(parse_pasv_port("Entering Passive Mode").is_err());
        assert!(parse_pasv_port("(10,0,0,5,300,80)").is_err());
    }

    #[test]
    fn test_reply_code() {
        assert_eq!(reply_code("220 ready").unwrap(), 220);
        assert!(reply_code("2x0").is_err());
        assert!(reply_code("").is_err());
    }

    #[test]
    fn test_unexpected_hides_arguments() {
        let err = unexpected(
            "PASS secret",
            Reply {
                code: 530,
                message: "Login incorrect.".into(),
            },
        );
        let text = err.to_string();
        assert!(text.contains("PASS"));
        assert!(!text.contains("secret"));
    }
}
