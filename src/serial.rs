//! Opening the serial device.

use crate::error::{Error, Result};
use nix::fcntl::OFlag;
use nix::sys::termios::{
    self, BaudRate, ControlFlags, InputFlags, SetArg, SpecialCharacterIndices,
};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Open `path` for reading and writing and configure it as a raw 8N1 line
/// at `baud` with no flow control.
///
/// Reads block until at least one byte is available.
pub fn open(path: &Path, baud: u32) -> Result<File> {
    let setup = |reason: String| Error::Setup {
        path: path.to_path_buf(),
        reason,
    };

    let speed = baud_rate(baud).ok_or_else(|| setup(format!("unsupported baud rate {baud}")))?;
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(OFlag::O_NOCTTY.bits())
        .open(path)
        .map_err(|e| setup(e.to_string()))?;

    let mut tio = termios::tcgetattr(&file).map_err(|e| setup(format!("not a tty: {e}")))?;
    termios::cfmakeraw(&mut tio);
    termios::cfsetspeed(&mut tio, speed).map_err(|e| setup(e.to_string()))?;
    tio.control_flags.insert(ControlFlags::CLOCAL | ControlFlags::CREAD);
    tio.control_flags.remove(ControlFlags::CSTOPB | ControlFlags::CRTSCTS);
    tio.input_flags.remove(InputFlags::IXON | InputFlags::IXOFF | InputFlags::IXANY);
    tio.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
    tio.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
    termios::tcsetattr(&file, SetArg::TCSANOW, &tio).map_err(|e| setup(e.to_string()))?;

    Ok(file)
}

/// Map a numeric rate to the termios constant.
fn baud_rate(baud: u32) -> Option<BaudRate> {
    let rate = match baud {
        50 => BaudRate::B50,
        75 => BaudRate::B75,
        110 => BaudRate::B110,
        134 => BaudRate::B134,
        150 => BaudRate::B150,
        200 => BaudRate::B200,
        300 => BaudRate::B300,
        600 => BaudRate::B600,
        1200 => BaudRate::B1200,
        1800 => BaudRate::B1800,
        2400 => BaudRate::B2400,
        4800 => BaudRate::B4800,
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        230400 => BaudRate::B230400,
        #[cfg(target_os = "linux")]
        460800 => BaudRate::B460800,
        #[cfg(target_os = "linux")]
        500000 => BaudRate::B500000,
        #[cfg(target_os = "linux")]
        576000 => BaudRate::B576000,
        #[cfg(target_os = "linux")]
        921600 => BaudRate::B921600,
        #[cfg(target_os = "linux")]
        1000000 => BaudRate::B1000000,
        #[cfg(target_os = "linux")]
        1500000 => BaudRate::B1500000,
        #[cfg(target_os = "linux")]
        2000000 => BaudRate::B2000000,
        #[cfg(target_os = "linux")]
        3000000 => BaudRate::B3000000,
        #[cfg(target_os = "linux")]
        4000000 => BaudRate::B4000000,
        _ => return None,
    };
    Some(rate)
}
