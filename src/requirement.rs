use crate::error::{Result, WizError};
use crate::version::{Version, parse_relaxed};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// ==version (also accepts the single `=` form)
    Equal,
    /// !=version
    NotEqual,
    /// <version
    Less,
    /// <=version
    LessEqual,
    /// >version
    Greater,
    /// >=version
    GreaterEqual,
    /// ~=version (compatible release - PEP 440)
    Compatible,
}

impl Operator {
    fn as_str(self) -> &'static str {
        match self {
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::Less => "<",
            Operator::LessEqual => "<=",
            Operator::Greater => ">",
            Operator::GreaterEqual => ">=",
            Operator::Compatible => "~=",
        }
    }
}

/// A single `op version` clause within a specifier set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    pub operator: Operator,
    pub version: String,
}

impl Specifier {
    /// Parse one clause. Operators are matched longest-first so that `>=`
    /// wins over `>`.
    fn parse(clause: &str) -> Result<Self> {
        const OPERATORS: [(&str, Operator); 8] = [
            ("~=", Operator::Compatible),
            ("==", Operator::Equal),
            ("!=", Operator::NotEqual),
            (">=", Operator::GreaterEqual),
            ("<=", Operator::LessEqual),
            (">", Operator::Greater),
            ("<", Operator::Less),
            ("=", Operator::Equal),
        ];

        for (token, operator) in OPERATORS {
            if let Some(version) = clause.strip_prefix(token) {
                let version = version.trim();
                if parse_relaxed(version).is_none() {
                    return Err(WizError::InvalidRequirement(clause.to_string()));
                }
                return Ok(Specifier {
                    operator,
                    version: version.to_string(),
                });
            }
        }
        Err(WizError::InvalidRequirement(clause.to_string()))
    }

    pub fn is_satisfied_by(&self, version: &Version) -> bool {
        let candidate = match version.as_concrete() {
            Some(candidate) => candidate,
            // The unknown sentinel never satisfies an explicit clause.
            None => return false,
        };
        let pinned = match parse_relaxed(&self.version) {
            Some(pinned) => pinned,
            None => return false,
        };
        match self.operator {
            Operator::Equal => *candidate == pinned,
            Operator::NotEqual => *candidate != pinned,
            Operator::Less => *candidate < pinned,
            Operator::LessEqual => *candidate <= pinned,
            Operator::Greater => *candidate > pinned,
            Operator::GreaterEqual => *candidate >= pinned,
            Operator::Compatible => is_compatible_release(candidate, &pinned, &self.version),
        }
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator.as_str(), self.version)
    }
}

/// Conjunction of clauses: a version satisfies the set iff it satisfies
/// every clause. The empty set is satisfied by anything, including the
/// unknown sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecifierSet {
    specifiers: Vec<Specifier>,
}

impl SpecifierSet {
    pub fn is_empty(&self) -> bool {
        self.specifiers.is_empty()
    }

    pub fn specifiers(&self) -> &[Specifier] {
        &self.specifiers
    }

    pub fn contains(&self, version: &Version) -> bool {
        if self.specifiers.is_empty() {
            return true;
        }
        if version.is_unknown() {
            return false;
        }
        self.specifiers
            .iter()
            .all(|specifier| specifier.is_satisfied_by(version))
    }

    /// Union the clause lists. Duplicate clauses are not added twice, so
    /// intersecting with an already-included set is a no-op.
    pub fn intersect(&mut self, other: &SpecifierSet) {
        for specifier in &other.specifiers {
            if !self.specifiers.contains(specifier) {
                self.specifiers.push(specifier.clone());
            }
        }
    }

    fn push(&mut self, specifier: Specifier) {
        if !self.specifiers.contains(&specifier) {
            self.specifiers.push(specifier);
        }
    }
}

impl fmt::Display for SpecifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, specifier) in self.specifiers.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{specifier}")?;
        }
        Ok(())
    }
}

/// Package request: `name[extra1,extra2] op v, op v, ...`.
///
/// Extras name definition variants; a bare `name` accepts any version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub extras: Vec<String>,
    pub specifiers: SpecifierSet,
}

impl Requirement {
    pub fn is_satisfied_by(&self, version: &Version) -> bool {
        self.specifiers.contains(version)
    }

    /// Extras compared as sets: the declared order does not matter when two
    /// requirements are checked for requesting the same variants.
    pub fn same_extras(&self, other: &Requirement) -> bool {
        let mut left = self.extras.clone();
        let mut right = other.extras.clone();
        left.sort();
        right.sort();
        left == right
    }
}

impl FromStr for Requirement {
    type Err = WizError;

    fn from_str(s: &str) -> Result<Self> {
        let input = s.trim();
        if input.is_empty() {
            return Err(WizError::InvalidRequirement(s.to_string()));
        }

        let (head, clauses) = match input.find(|c| "<>=!~".contains(c)) {
            Some(idx) => input.split_at(idx),
            None => (input, ""),
        };
        let head = head.trim();

        let (name, extras) = match head.find('[') {
            Some(open) => {
                let close = head
                    .rfind(']')
                    .filter(|&close| close > open)
                    .ok_or_else(|| WizError::InvalidRequirement(s.to_string()))?;
                if !head[close + 1..].trim().is_empty() {
                    return Err(WizError::InvalidRequirement(s.to_string()));
                }
                let extras: Vec<String> = head[open + 1..close]
                    .split(',')
                    .map(|extra| extra.trim().to_string())
                    .collect();
                if extras.iter().any(String::is_empty) {
                    return Err(WizError::InvalidRequirement(s.to_string()));
                }
                (head[..open].trim(), extras)
            }
            None => (head, Vec::new()),
        };

        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(WizError::InvalidRequirement(s.to_string()));
        }

        let mut specifiers = SpecifierSet::default();
        if !clauses.trim().is_empty() {
            for clause in clauses.split(',') {
                let specifier = Specifier::parse(clause.trim())
                    .map_err(|_| WizError::InvalidRequirement(s.to_string()))?;
                specifiers.push(specifier);
            }
        }

        Ok(Requirement {
            name: name.to_string(),
            extras,
            specifiers,
        })
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            write!(f, "[{}]", self.extras.join(","))?;
        }
        if !self.specifiers.is_empty() {
            write!(f, "{}", self.specifiers)?;
        }
        Ok(())
    }
}

impl Serialize for Requirement {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Requirement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Check the compatible release constraint (~=) against the raw clause text:
/// `~=X.Y.Z` pins the `X.Y` series, `~=X.Y` pins the major.
fn is_compatible_release(candidate: &semver::Version, pinned: &semver::Version, raw: &str) -> bool {
    if candidate.cmp(pinned) == Ordering::Less {
        return false;
    }
    let declared = raw
        .split('.')
        .take_while(|part| part.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .count();
    match declared {
        0 => false,
        1 => true,
        2 => candidate.major == pinned.major,
        _ => candidate.major == pinned.major && candidate.minor == pinned.minor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(input: &str) -> Requirement {
        input.parse().unwrap()
    }

    fn version(input: &str) -> Version {
        Version::parse(input).unwrap()
    }

    #[test]
    fn parses_plain_name() {
        let requirement = req("maya");
        assert_eq!(requirement.name, "maya");
        assert!(requirement.extras.is_empty());
        assert!(requirement.specifiers.is_empty());
        assert!(requirement.is_satisfied_by(&Version::Unknown));
    }

    #[test]
    fn parses_extras_and_clauses() {
        let requirement = req("nuke[studio,hiero] >=10.5, <11");
        assert_eq!(requirement.name, "nuke");
        assert_eq!(requirement.extras, vec!["studio", "hiero"]);
        assert!(requirement.is_satisfied_by(&version("10.8")));
        assert!(!requirement.is_satisfied_by(&version("11.0")));
        assert!(!requirement.is_satisfied_by(&version("9.0")));
    }

    #[test]
    fn single_equal_is_an_alias() {
        assert_eq!(req("app=1.0"), req("app==1.0"));
    }

    #[test]
    fn shorthand_versions_compare_equal() {
        assert!(req("app==1").is_satisfied_by(&version("1.0.0")));
        assert!(req("app!=1").is_satisfied_by(&version("1.0.1")));
    }

    #[test]
    fn unknown_satisfies_only_the_empty_set() {
        assert!(req("app").is_satisfied_by(&Version::Unknown));
        assert!(!req("app>=0").is_satisfied_by(&Version::Unknown));
    }

    #[test]
    fn compatible_release_pins_the_series() {
        let requirement = req("app~=2.1.0");
        assert!(requirement.is_satisfied_by(&version("2.1.5")));
        assert!(!requirement.is_satisfied_by(&version("2.2.0")));
        assert!(!requirement.is_satisfied_by(&version("2.0.9")));

        let requirement = req("app~=2.1");
        assert!(requirement.is_satisfied_by(&version("2.9.0")));
        assert!(!requirement.is_satisfied_by(&version("3.0.0")));
    }

    #[test]
    fn rejects_malformed_input() {
        for input in ["", ">=1.0", "app[", "app[]>=1", "app==", "app??1"] {
            assert!(
                matches!(input.parse::<Requirement>(), Err(WizError::InvalidRequirement(_))),
                "expected failure for {input:?}"
            );
        }
    }

    #[test]
    fn display_round_trips() {
        for input in ["app", "app==1.0", "app[gui]>=1.0, <2.0", "app~=3.2"] {
            let requirement = req(input);
            assert_eq!(req(&requirement.to_string()), requirement);
        }
    }

    #[test]
    fn intersection_is_idempotent() {
        let mut combined = req("app>=1.0").specifiers;
        combined.intersect(&req("app<2.0").specifiers);
        combined.intersect(&req("app>=1.0, <2.0").specifiers);
        assert_eq!(combined.specifiers().len(), 2);
        assert!(combined.contains(&version("1.5")));
        assert!(!combined.contains(&version("2.0")));
    }
}
