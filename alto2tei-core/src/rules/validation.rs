use crate::config::ConversionConfig;
use crate::rules::table::LineAction;
use std::fmt;

// Configuration validation - warnings about rule combinations that load fine
// but will not do what the author probably meant. Never fatal.

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    pub block_types_checked: usize,
    pub line_types_checked: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    SkipAndProcess {
        block: String,
    },
    ElementOverridesLines {
        block: String,
        element: String,
    },
    UnknownAction {
        line: String,
        action: String,
    },
    MissingElement {
        line: String,
    },
    UnknownSpecialLine {
        block: String,
        line: String,
    },
    MissingDefault {
        scope: &'static str,
        tag: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::SkipAndProcess { block } => {
                write!(f, "Block '{block}': cannot both skip_content and process_lines")
            }
            ValidationIssue::ElementOverridesLines { block, element } => write!(
                f,
                "Block '{block}': tei_element '{element}' replaces line processing"
            ),
            ValidationIssue::UnknownAction { line, action } => write!(
                f,
                "Line '{line}': unknown action '{action}' (valid: add_to_paragraph, start_paragraph, create_element, skip)"
            ),
            ValidationIssue::MissingElement { line } => {
                write!(f, "Line '{line}': action 'create_element' requires 'tei_element'")
            }
            ValidationIssue::UnknownSpecialLine { block, line } => write!(
                f,
                "Block '{block}': special line '{line}' has no line type"
            ),
            ValidationIssue::MissingDefault { scope, tag } => write!(
                f,
                "Default {scope} type '{tag}' is not configured; built-in rule used"
            ),
        }
    }
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Log every issue as a warning
    pub fn log(&self) {
        if self.issues.is_empty() {
            log::debug!(
                "✅ Configuration valid ({} block types, {} line types)",
                self.block_types_checked,
                self.line_types_checked
            );
            return;
        }
        log::warn!("⚠️  Configuration warnings:");
        for issue in &self.issues {
            log::warn!("   {issue}");
        }
    }
}

pub fn validate_config(config: &ConversionConfig) -> ValidationReport {
    let mut issues = Vec::new();

    // 1. Block type combinations
    validate_block_types(config, &mut issues);

    // 2. Line type actions and required fields
    validate_line_types(config, &mut issues);

    // 3. Defaults point at configured types
    if !config.block_types.contains_key(&config.defaults.block) {
        issues.push(ValidationIssue::MissingDefault {
            scope: "block",
            tag: config.defaults.block.clone(),
        });
    }
    if !config.line_types.contains_key(&config.defaults.line) {
        issues.push(ValidationIssue::MissingDefault {
            scope: "line",
            tag: config.defaults.line.clone(),
        });
    }

    ValidationReport {
        issues,
        block_types_checked: config.block_types.len(),
        line_types_checked: config.line_types.len(),
    }
}

fn validate_block_types(config: &ConversionConfig, issues: &mut Vec<ValidationIssue>) {
    for (name, block) in &config.block_types {
        if block.skip_content && block.process_lines {
            issues.push(ValidationIssue::SkipAndProcess {
                block: name.clone(),
            });
        }

        if let (Some(element), true) = (&block.tei_element, block.process_lines) {
            issues.push(ValidationIssue::ElementOverridesLines {
                block: name.clone(),
                element: element.clone(),
            });
        }

        for line in &block.special_lines {
            let category = line.split(':').next().unwrap_or(line).trim();
            if !config.line_types.contains_key(line.trim()) && !config.line_types.contains_key(category) {
                issues.push(ValidationIssue::UnknownSpecialLine {
                    block: name.clone(),
                    line: line.clone(),
                });
            }
        }
    }
}

fn validate_line_types(config: &ConversionConfig, issues: &mut Vec<ValidationIssue>) {
    for (name, line) in &config.line_types {
        match LineAction::from_name(&line.action) {
            None => issues.push(ValidationIssue::UnknownAction {
                line: name.clone(),
                action: line.action.clone(),
            }),
            Some(LineAction::CreateElement) if line.tei_element.is_none() => {
                issues.push(ValidationIssue::MissingElement { line: name.clone() })
            }
            Some(_) => {}
        }
    }
}
