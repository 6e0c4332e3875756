// Copyright (C) 2025 Barn Authors. This program is free software: you can
// redistribute it and/or modify it under the terms of the GNU General Public
// License as published by the Free Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Line splitting with a telnet-compatible sub-state: IAC command sequences are
//! stripped, subnegotiations skipped, doubled IAC is a literal 0xFF. Lines end
//! at CR, LF or CRLF (never counted twice).

const IAC: u8 = 255;
const SB: u8 = 250;
const SE: u8 = 240;
const WILL: u8 = 251;
const WONT: u8 = 252;
const DO: u8 = 253;
const DONT: u8 = 254;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TelnetState {
    Data,
    /// Saw IAC; deciding what kind of command follows.
    Iac,
    /// Saw IAC WILL/WONT/DO/DONT; one option byte follows.
    IacOption,
    /// Inside IAC SB ... IAC SE.
    Subnegotiation,
    /// Saw IAC inside a subnegotiation.
    SubnegotiationIac,
    /// Last data byte was CR; a following LF belongs to the same line end.
    SawCr,
}

/// Incremental line assembler over the raw socket bytes.
pub struct LineAssembler {
    state: TelnetState,
    current: Vec<u8>,
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl LineAssembler {
    pub fn new() -> Self {
        LineAssembler {
            state: TelnetState::Data,
            current: Vec::new(),
        }
    }

    /// Feed bytes; complete lines come out in order.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            if let Some(line) = self.push_byte(b) {
                lines.push(line);
            }
        }
        lines
    }

    fn take_line(&mut self) -> String {
        let bytes = std::mem::take(&mut self.current);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn push_byte(&mut self, b: u8) -> Option<String> {
        match self.state {
            TelnetState::Data => match b {
                IAC => {
                    self.state = TelnetState::Iac;
                    None
                }
                b'\r' => {
                    self.state = TelnetState::SawCr;
                    Some(self.take_line())
                }
                b'\n' => Some(self.take_line()),
                _ => {
                    self.current.push(b);
                    None
                }
            },
            TelnetState::SawCr => {
                self.state = TelnetState::Data;
                match b {
                    // The LF of a CRLF; swallowed.
                    b'\n' => None,
                    _ => self.push_byte(b),
                }
            }
            TelnetState::Iac => match b {
                IAC => {
                    // Doubled IAC is a literal 0xFF data byte.
                    self.current.push(IAC);
                    self.state = TelnetState::Data;
                    None
                }
                WILL | WONT | DO | DONT => {
                    self.state = TelnetState::IacOption;
                    None
                }
                SB => {
                    self.state = TelnetState::Subnegotiation;
                    None
                }
                _ => {
                    // Two-byte command; done.
                    self.state = TelnetState::Data;
                    None
                }
            },
            TelnetState::IacOption => {
                self.state = TelnetState::Data;
                None
            }
            TelnetState::Subnegotiation => {
                if b == IAC {
                    self.state = TelnetState::SubnegotiationIac;
                }
                None
            }
            TelnetState::SubnegotiationIac => {
                self.state = match b {
                    SE => TelnetState::Data,
                    _ => TelnetState::Subnegotiation,
                };
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines() {
        let mut t = LineAssembler::new();
        assert_eq!(t.push_bytes(b"hello\nworld\n"), vec!["hello", "world"]);
    }

    #[test]
    fn crlf_is_one_line_ending() {
        let mut t = LineAssembler::new();
        assert_eq!(t.push_bytes(b"a\r\nb\rc\n"), vec!["a", "b", "c"]);
    }

    #[test]
    fn crlf_split_across_reads() {
        let mut t = LineAssembler::new();
        assert_eq!(t.push_bytes(b"a\r"), vec!["a"]);
        assert!(t.push_bytes(b"\n").is_empty());
        assert_eq!(t.push_bytes(b"b\n"), vec!["b"]);
    }

    #[test]
    fn iac_commands_are_stripped() {
        let mut t = LineAssembler::new();
        // IAC WILL <option> in the middle of a line.
        let mut bytes = b"he".to_vec();
        bytes.extend([IAC, WILL, 31]);
        bytes.extend(b"llo\n");
        assert_eq!(t.push_bytes(&bytes), vec!["hello"]);
    }

    #[test]
    fn subnegotiation_runs_are_skipped() {
        let mut t = LineAssembler::new();
        let mut bytes = b"a".to_vec();
        bytes.extend([IAC, SB, 31, 1, 2, 3, IAC, SE]);
        bytes.extend(b"b\n");
        assert_eq!(t.push_bytes(&bytes), vec!["ab"]);
    }

    #[test]
    fn doubled_iac_is_literal() {
        let mut t = LineAssembler::new();
        let bytes = [b'x', IAC, IAC, b'y', b'\n'];
        let lines = t.push_bytes(&bytes);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].as_bytes()[0], b'x');
        // 0xFF is not valid UTF-8 alone; it survives as the replacement
        // character rather than vanishing.
        assert!(lines[0].chars().count() >= 3);
    }
}
