//! Document and evaluator options.
//!
//! Both option structs follow a plain-struct-plus-builder layout: every
//! field is public and `Default` gives the settings used by the CLI.

/// Rendering intent requested by the caller of an operator-list build.
///
/// Annotations and optional content are filtered differently per intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum Intent {
    #[default]
    Display,
    Print,
    /// Optional-content aware evaluation (hidden groups are skipped).
    Oc,
}

impl std::str::FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "display" => Ok(Self::Display),
            "print" => Ok(Self::Print),
            "oc" => Ok(Self::Oc),
            other => Err(format!("unknown intent: {other}")),
        }
    }
}

/// Options applied when a document is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentOptions {
    /// Password tried against the standard security handler at load time.
    pub password: Option<Vec<u8>>,
    /// Upper bound on cached parsed objects; 0 means unbounded. A full cache
    /// is flushed and refilled on demand.
    pub cache_capacity: usize,
    /// Allow placeholder substitution and a full object scan when the
    /// cross-reference data at `startxref` is unusable.
    pub recovery: bool,
    /// Page trees deeper than this are treated as malformed.
    pub max_page_tree_depth: usize,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            password: None,
            cache_capacity: 0,
            recovery: true,
            max_page_tree_depth: 64,
        }
    }
}

impl DocumentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the password used to unlock an encrypted document.
    pub fn password(mut self, password: impl AsRef<[u8]>) -> Self {
        self.password = Some(password.as_ref().to_vec());
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Enables or disables recovery mode.
    pub fn recovery(mut self, recovery: bool) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn max_page_tree_depth(mut self, depth: usize) -> Self {
        self.max_page_tree_depth = depth;
        self
    }
}

/// Options for a single operator-list or text-content evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorOptions {
    /// Operators processed per `step` before control is handed back.
    pub batch_size: usize,
    pub intent: Intent,
    /// Nesting limit for form XObjects and tiling patterns.
    pub max_form_depth: usize,
    /// Decode image streams through their filters when building image ops.
    pub decode_images: bool,
    /// Apply NFKC normalization to extracted text.
    pub normalize_unicode: bool,
    /// Emit marked-content boundaries as text content items.
    pub include_marked_content: bool,
    /// Warn and continue past operator failures instead of returning them.
    pub ignore_errors: bool,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self {
            batch_size: 256,
            intent: Intent::Display,
            max_form_depth: 32,
            decode_images: true,
            normalize_unicode: false,
            include_marked_content: false,
            ignore_errors: true,
        }
    }
}

impl EvaluatorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of operators handled per step. Zero is treated as one.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn intent(mut self, intent: Intent) -> Self {
        self.intent = intent;
        self
    }

    pub fn max_form_depth(mut self, depth: usize) -> Self {
        self.max_form_depth = depth;
        self
    }

    pub fn decode_images(mut self, decode: bool) -> Self {
        self.decode_images = decode;
        self
    }

    pub fn normalize_unicode(mut self, normalize: bool) -> Self {
        self.normalize_unicode = normalize;
        self
    }

    pub fn include_marked_content(mut self, include: bool) -> Self {
        self.include_marked_content = include;
        self
    }

    pub fn ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chains() {
        let opts = DocumentOptions::new().password("pw").recovery(false);
        assert_eq!(opts.password.as_deref(), Some(&b"pw"[..]));
        assert!(!opts.recovery);

        let eval = EvaluatorOptions::new().batch_size(0).intent(Intent::Print);
        assert_eq!(eval.batch_size, 1);
        assert_eq!(eval.intent, Intent::Print);
    }

    #[test]
    fn test_intent_from_str() {
        assert_eq!("oc".parse::<Intent>(), Ok(Intent::Oc));
        assert!("screen".parse::<Intent>().is_err());
    }
}
