use std::fmt;

use crate::{InitiatorRule, InvalidRuleError, ParseError, PolicyConfig, RepeatRule, RuleKind};

/////////////////////////////////////////////// EntityDecl /////////////////////////////////////////

/// A serializable declaration of every interaction an entity type accepts.
///
/// # Example
///
/// ```
/// use interactions::EntityDecl;
///
/// let decl = EntityDecl::parse("entity Monster { heal: with Healer @ once }").unwrap();
/// assert_eq!("Monster", decl.name);
/// let configs = decl.policy_configs().unwrap();
/// assert_eq!("heal: with Healer @ once", configs[0].to_string());
/// ```
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct EntityDecl {
    /// The entity type being declared.
    pub name: String,
    /// The action clauses, in declaration order.
    #[serde(default)]
    pub actions: Vec<ActionDecl>,
}

impl EntityDecl {
    /// Parse the textual declaration language.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        crate::parser::parse(input)
    }

    /// Parse text holding any number of consecutive declarations.
    pub fn parse_all(input: &str) -> Result<Vec<Self>, ParseError> {
        crate::parser::parse_all(input)
    }

    /// One [`PolicyConfig`] per declared action, in declaration order.
    pub fn policy_configs(&self) -> Result<Vec<PolicyConfig>, InvalidRuleError> {
        let mut configs = vec![];
        for decl in self.actions.iter() {
            for action in decl.actions.iter() {
                configs.push(decl.policy_config(&self.name, action)?);
            }
        }
        Ok(configs)
    }
}

impl fmt::Display for EntityDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "entity {} {{", self.name)?;
        for decl in self.actions.iter() {
            writeln!(f, "    {decl},")?;
        }
        write!(f, "}}")
    }
}

/////////////////////////////////////////////// ActionDecl /////////////////////////////////////////

/// One clause of an [`EntityDecl`]: actions sharing an initiator rule and a repeatability rule.
///
/// The rules are kept in their JSON form:
///
/// - `with`: `"any"`, a type name, an array of type names, or `{"method": NAME}`.
/// - `only_once`: `true`, `false`, or `{"method": NAME}`.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ActionDecl {
    /// The actions this clause declares.
    pub actions: Vec<String>,
    /// The initiator rule.
    #[serde(default = "any_initiator")]
    pub with: serde_json::Value,
    /// The repeatability rule.
    #[serde(default = "repeatable")]
    pub only_once: serde_json::Value,
}

fn any_initiator() -> serde_json::Value {
    serde_json::Value::String("any".to_string())
}

fn repeatable() -> serde_json::Value {
    serde_json::Value::Bool(false)
}

impl ActionDecl {
    /// A clause for `actions` open to any initiator, repeatedly.
    pub fn new<S: Into<String>>(actions: impl IntoIterator<Item = S>) -> Self {
        Self {
            actions: actions.into_iter().map(|a| a.into()).collect(),
            with: any_initiator(),
            only_once: repeatable(),
        }
    }

    /// Interpret this clause for one of its actions.
    pub fn policy_config(
        &self,
        entity_type: &str,
        action: &str,
    ) -> Result<PolicyConfig, InvalidRuleError> {
        let invalid = |rule, spec: &serde_json::Value, reason: &str| InvalidRuleError {
            entity_type: entity_type.to_string(),
            action: action.to_string(),
            rule,
            spec: spec.to_string(),
            reason: reason.to_string(),
        };
        let initiator = match &self.with {
            serde_json::Value::String(s) if s == "any" => InitiatorRule::Any,
            serde_json::Value::String(s) => InitiatorRule::of_type(s.as_str()),
            serde_json::Value::Array(types) => {
                let mut names = vec![];
                for t in types.iter() {
                    match t.as_str() {
                        Some(name) => names.push(name.to_string()),
                        None => {
                            return Err(invalid(
                                RuleKind::Initiator,
                                &self.with,
                                "type set members must be type names",
                            ))
                        }
                    }
                }
                InitiatorRule::one_of(names)
            }
            value => match method_name(value) {
                Some(name) => InitiatorRule::method(name),
                None => {
                    return Err(invalid(
                        RuleKind::Initiator,
                        &self.with,
                        "unrecognized initiator specification",
                    ))
                }
            },
        };
        let repeat = match &self.only_once {
            serde_json::Value::Bool(b) => RepeatRule::from(*b),
            value => match method_name(value) {
                Some(name) => RepeatRule::method(name),
                None => {
                    return Err(invalid(
                        RuleKind::Repeatability,
                        &self.only_once,
                        "unrecognized repeatability specification",
                    ))
                }
            },
        };
        Ok(PolicyConfig::new(action)
            .with(initiator)
            .only_once(repeat))
    }
}

fn method_name(value: &serde_json::Value) -> Option<&str> {
    match value {
        serde_json::Value::Object(obj) if obj.len() == 1 => obj.get("method")?.as_str(),
        _ => None,
    }
}

impl fmt::Display for ActionDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: with ", self.actions.join(", "))?;
        match &self.with {
            serde_json::Value::String(s) => write!(f, "{s}")?,
            serde_json::Value::Array(types) if types.iter().all(|t| t.is_string()) => {
                let names = types.iter().filter_map(|t| t.as_str()).collect::<Vec<_>>();
                write!(f, "[{}]", names.join(", "))?;
            }
            value => match method_name(value) {
                Some(name) => write!(f, "method {name}")?,
                None => write!(f, "{value}")?,
            },
        }
        match &self.only_once {
            serde_json::Value::Bool(false) => Ok(()),
            serde_json::Value::Bool(true) => write!(f, " @ once"),
            value => match method_name(value) {
                Some(name) => write!(f, " @ method {name}"),
                None => write!(f, " @ {value}"),
            },
        }
    }
}
