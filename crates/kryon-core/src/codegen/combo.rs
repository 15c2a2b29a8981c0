//! Language/toolkit combination validation.
//!
//! The pipeline consults this once per build, before any file is written.

use std::fmt;

/// Target language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    C,
    Tcl,
}

impl Language {
    pub fn name(self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Tcl => "tcl",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "c" => Some(Language::C),
            "tcl" | "tcltk" => Some(Language::Tcl),
            _ => None,
        }
    }

    /// Toolkit used when the target string names no toolkit.
    pub fn default_toolkit(self) -> Toolkit {
        match self {
            Language::C => Toolkit::Raylib,
            Language::Tcl => Toolkit::Tk,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Target toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toolkit {
    Tk,
    Terminal,
    Sdl3,
    Raylib,
}

impl Toolkit {
    pub fn name(self) -> &'static str {
        match self {
            Toolkit::Tk => "tk",
            Toolkit::Terminal => "terminal",
            Toolkit::Sdl3 => "sdl3",
            Toolkit::Raylib => "raylib",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "tk" => Some(Toolkit::Tk),
            "terminal" => Some(Toolkit::Terminal),
            "sdl3" => Some(Toolkit::Sdl3),
            "raylib" => Some(Toolkit::Raylib),
            _ => None,
        }
    }
}

impl fmt::Display for Toolkit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Validation result for a `(language, toolkit)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComboValidity {
    Valid,
    Invalid { reason: String },
}

impl ComboValidity {
    pub fn is_valid(&self) -> bool {
        matches!(self, ComboValidity::Valid)
    }
}

/// Validation matrix: language (row) x toolkit (column).
const VALIDATION_MATRIX: [[bool; 4]; 2] = [
    //          Tk     Terminal  SDL3   Raylib
    /* C   */ [true, true, true, true],
    /* Tcl */ [true, true, false, false],
];

fn matrix_index(language: Language, toolkit: Toolkit) -> (usize, usize) {
    let row = match language {
        Language::C => 0,
        Language::Tcl => 1,
    };
    let col = match toolkit {
        Toolkit::Tk => 0,
        Toolkit::Terminal => 1,
        Toolkit::Sdl3 => 2,
        Toolkit::Raylib => 3,
    };
    (row, col)
}

/// Validate a combination, returning a human-readable reason when invalid.
pub fn validate(language: Language, toolkit: Toolkit) -> ComboValidity {
    let (row, col) = matrix_index(language, toolkit);
    if VALIDATION_MATRIX[row][col] {
        ComboValidity::Valid
    } else {
        ComboValidity::Invalid {
            reason: format!("{language} doesn't support the {toolkit} toolkit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_supports_all_toolkits() {
        for toolkit in [Toolkit::Tk, Toolkit::Terminal, Toolkit::Sdl3, Toolkit::Raylib] {
            assert!(validate(Language::C, toolkit).is_valid());
        }
    }

    #[test]
    fn test_tcl_rejects_raylib_with_reason() {
        match validate(Language::Tcl, Toolkit::Raylib) {
            ComboValidity::Invalid { reason } => {
                assert!(reason.contains("tcl"));
                assert!(reason.contains("raylib"));
            }
            ComboValidity::Valid => panic!("tcl+raylib should be invalid"),
        }
    }

    #[test]
    fn test_language_parsing_accepts_tcltk_alias() {
        assert_eq!(Language::from_name("tcltk"), Some(Language::Tcl));
        assert_eq!(Language::from_name("cobol"), None);
    }
}
