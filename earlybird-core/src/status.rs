//! Per-epoch status line shown on the console.

/// Plain status text plus whether the epoch set a new best.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub is_best: bool,
}

impl StatusLine {
    pub fn new(loss: f64, accuracy: f64, epoch: u64, is_best: bool) -> Self {
        Self {
            text: format!("Validation results, EPOCH {epoch} : Loss {loss} | Accuracy {accuracy}"),
            is_best,
        }
    }

    /// Best epochs are shouted: the whole line is upper-cased.
    pub fn render(&self) -> String {
        if self.is_best {
            self.text.to_uppercase()
        } else {
            self.text.clone()
        }
    }
}

impl std::fmt::Display for StatusLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

pub fn format_status(loss: f64, accuracy: f64, epoch: u64, is_best: bool) -> String {
    StatusLine::new(loss, accuracy, epoch, is_best).render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_is_upper_case() {
        let msg = format_status(0.5, 0.9, 3, true);
        assert_eq!(msg, msg.to_uppercase());
        assert!(msg.contains("EPOCH 3"));
        assert!(msg.contains("LOSS 0.5"));
        assert!(msg.contains("ACCURACY 0.9"));
    }

    #[test]
    fn test_not_best_keeps_case() {
        assert_eq!(
            format_status(0.5, 0.9, 3, false),
            "Validation results, EPOCH 3 : Loss 0.5 | Accuracy 0.9"
        );
    }

    #[test]
    fn test_display_matches_render() {
        let line = StatusLine::new(1.25, 0.0, 1, true);
        assert_eq!(line.to_string(), line.render());
        assert!(!line.text.contains("LOSS"));
    }

    #[test]
    fn test_default_float_display() {
        let line = StatusLine::new(2.0, 1.0, 10, false);
        assert_eq!(line.text, "Validation results, EPOCH 10 : Loss 2 | Accuracy 1");
    }
}
