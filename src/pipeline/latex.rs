//! Deterministic LaTeX → plain-text transform.
//!
//! The recognized markup for an equation region is LaTeX; the rewording
//! model receives plain text. This module applies cheap, deterministic
//! regex/string rules that turn common textbook notation into speakable
//! characters without any model in the loop, so the transform is exactly
//! reproducible and independently testable.
//!
//! ## Rule order
//!
//! Rules must run in this order: math delimiters are stripped before macro
//! rewriting so `\[`/`\(` are not mistaken for unknown macros; fractions
//! and roots are rewritten while their brace groups are still intact;
//! symbol macros are substituted before the generic unknown-macro pass
//! strips backslashes; brace removal and whitespace collapsing run last.

use once_cell::sync::Lazy;
use regex::Regex;

/// Convert a LaTeX fragment to plain text.
///
/// Rules (applied in order):
/// 1. Strip math delimiters (`$`, `$$`, `\[ \]`, `\( \)`)
/// 2. Rewrite `\frac{a}{b}` as `a/b` (innermost first, nested supported)
/// 3. Rewrite `\sqrt{x}` as `√(x)`
/// 4. Substitute symbol macros (greek letters, operators, relations)
/// 5. Convert single-digit superscripts/subscripts to Unicode
/// 6. Unwrap `\text{…}`, `\mathrm{…}`, `\mbox{…}`
/// 7. Replace spacing macros with a space, drop `\left`/`\right`
/// 8. Demote remaining unknown macros to their bare name
/// 9. Remove leftover braces
/// 10. Collapse runs of whitespace
pub fn latex_to_text(input: &str) -> String {
    let s = strip_delimiters(input);
    let s = rewrite_fractions_and_roots(&s);
    let s = substitute_symbols(&s);
    let s = convert_scripts(&s);
    let s = unwrap_text_macros(&s);
    let s = normalise_spacing_macros(&s);
    let s = demote_unknown_macros(&s);
    let s = remove_braces(&s);
    collapse_whitespace(&s)
}

// ── Rule 1: math delimiters ──────────────────────────────────────────────

fn strip_delimiters(input: &str) -> String {
    input
        .replace("\\[", " ")
        .replace("\\]", " ")
        .replace("\\(", " ")
        .replace("\\)", " ")
        .replace('$', " ")
}

// ── Rules 2 + 3: fractions and roots ─────────────────────────────────────

static RE_FRAC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\[dt]?frac\{([^{}]*)\}\{([^{}]*)\}").unwrap());
static RE_SQRT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\sqrt\{([^{}]*)\}").unwrap());

fn rewrite_fractions_and_roots(input: &str) -> String {
    // Only brace-free argument groups match, so each pass resolves the
    // innermost constructs; iterate until stable so fractions nested in
    // roots (and vice versa) resolve outward. The iteration cap bounds
    // pathological inputs; real textbook nesting is depth 2–3.
    let mut s = input.to_string();
    for _ in 0..8 {
        let next = RE_SQRT
            .replace_all(&RE_FRAC.replace_all(&s, "($1/$2)"), "√($1)")
            .to_string();
        if next == s {
            break;
        }
        s = next;
    }
    s
}

// ── Rule 4: symbol macros ────────────────────────────────────────────────

/// Macro → replacement, longest names first so `\alpha` wins over `\a`.
const SYMBOLS: [(&str, &str); 34] = [
    ("\\varepsilon", "ε"),
    ("\\epsilon", "ε"),
    ("\\lambda", "λ"),
    ("\\approx", "≈"),
    ("\\infty", "∞"),
    ("\\alpha", "α"),
    ("\\gamma", "γ"),
    ("\\delta", "δ"),
    ("\\theta", "θ"),
    ("\\sigma", "σ"),
    ("\\omega", "ω"),
    ("\\times", "×"),
    ("\\cdot", "⋅"),
    ("\\beta", "β"),
    ("\\Delta", "Δ"),
    ("\\Sigma", "Σ"),
    ("\\Omega", "Ω"),
    ("\\mu", "μ"),
    ("\\pi", "π"),
    ("\\phi", "φ"),
    ("\\psi", "ψ"),
    ("\\rho", "ρ"),
    ("\\tau", "τ"),
    ("\\leq", "≤"),
    ("\\geq", "≥"),
    ("\\neq", "≠"),
    ("\\pm", "±"),
    ("\\div", "÷"),
    ("\\sum", "∑"),
    ("\\prod", "∏"),
    ("\\int", "∫"),
    ("\\partial", "∂"),
    ("\\rightarrow", "→"),
    ("\\to", "→"),
];

fn substitute_symbols(input: &str) -> String {
    let mut s = input.to_string();
    for (macro_name, replacement) in SYMBOLS {
        s = s.replace(macro_name, replacement);
    }
    s
}

// ── Rule 5: superscripts and subscripts ──────────────────────────────────

const SUPERSCRIPT_DIGITS: [char; 10] = ['⁰', '¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹'];
const SUBSCRIPT_DIGITS: [char; 10] = ['₀', '₁', '₂', '₃', '₄', '₅', '₆', '₇', '₈', '₉'];

static RE_SUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\^\{?([0-9])\}?").unwrap());
static RE_SUB: Lazy<Regex> = Lazy::new(|| Regex::new(r"_\{?([0-9])\}?").unwrap());

fn convert_scripts(input: &str) -> String {
    let s = RE_SUP
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let d = caps[1].chars().next().unwrap_or('0') as usize - '0' as usize;
            SUPERSCRIPT_DIGITS[d].to_string()
        })
        .to_string();
    RE_SUB
        .replace_all(&s, |caps: &regex::Captures<'_>| {
            let d = caps[1].chars().next().unwrap_or('0') as usize - '0' as usize;
            SUBSCRIPT_DIGITS[d].to_string()
        })
        .to_string()
}

// ── Rule 6: text macros ──────────────────────────────────────────────────

static RE_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(?:text|mathrm|mbox)\{([^{}]*)\}").unwrap());

fn unwrap_text_macros(input: &str) -> String {
    RE_TEXT.replace_all(input, "$1").to_string()
}

// ── Rule 7: spacing macros ───────────────────────────────────────────────

static RE_SPACING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(?:quad|qquad|,|;|!|\s)").unwrap());
static RE_SIZING: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\(?:left|right|big|Big)").unwrap());

fn normalise_spacing_macros(input: &str) -> String {
    let s = RE_SPACING.replace_all(input, " ").to_string();
    RE_SIZING.replace_all(&s, "").to_string()
}

// ── Rule 8: unknown macros ───────────────────────────────────────────────

static RE_MACRO: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\([a-zA-Z]+)").unwrap());

fn demote_unknown_macros(input: &str) -> String {
    RE_MACRO.replace_all(input, "$1").to_string()
}

// ── Rule 9: braces ───────────────────────────────────────────────────────

fn remove_braces(input: &str) -> String {
    input.replace(['{', '}'], "")
}

// ── Rule 10: whitespace ──────────────────────────────────────────────────

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn collapse_whitespace(input: &str) -> String {
    RE_WS.replace_all(input, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadratic_formula() {
        let latex = r"x = \frac{-b \pm \sqrt{b^2 - 4ac}}{2a}";
        assert_eq!(latex_to_text(latex), "x = ((-b ± √(b² - 4ac))/(2a))");
    }

    #[test]
    fn dollar_delimiters_are_stripped() {
        assert_eq!(latex_to_text("$E = mc^2$"), "E = mc²");
    }

    #[test]
    fn nested_fractions_resolve_innermost_first() {
        let latex = r"\frac{1}{\frac{2}{3}}";
        assert_eq!(latex_to_text(latex), "(1/((2/3)))");
    }

    #[test]
    fn greek_and_operators() {
        assert_eq!(
            latex_to_text(r"\alpha \times \beta \leq \pi"),
            "α × β ≤ π"
        );
    }

    #[test]
    fn text_macro_is_unwrapped() {
        assert_eq!(
            latex_to_text(r"\text{area} = \pi r^2"),
            "area = π r²"
        );
    }

    #[test]
    fn subscripts_become_unicode() {
        assert_eq!(latex_to_text(r"x_1 + x_{2}"), "x₁ + x₂");
    }

    #[test]
    fn unknown_macro_keeps_its_name() {
        assert_eq!(latex_to_text(r"\operatorname{\sin}(x)"), "operatornamesin(x)");
    }

    #[test]
    fn left_right_sizing_is_dropped() {
        assert_eq!(latex_to_text(r"\left( x \right)"), "( x )");
    }

    #[test]
    fn transform_is_deterministic() {
        let latex = r"\sum_{i} \frac{a_i}{n}";
        assert_eq!(latex_to_text(latex), latex_to_text(latex));
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(latex_to_text("already plain"), "already plain");
    }
}
