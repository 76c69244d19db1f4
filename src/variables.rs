//! 外部变量：类型、取值与声明表（schema）
//! 编译期声明名称+类型（可带默认值），扫描期由 Scanner 按索引绑定

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::fmt;

use crate::error::VariableError;
use crate::parser::is_keyword;

/// 变量名校验：字母/下划线开头，最长128字符
static IDENT_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,127}$").ok());

/// 外部变量类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Type {
    Integer,
    Float,
    Bool,
    String,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Integer => write!(f, "integer"),
            Type::Float => write!(f, "float"),
            Type::Bool => write!(f, "boolean"),
            Type::String => write!(f, "string"),
        }
    }
}

/// 带类型标签的变量值
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Variable {
    Integer(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

impl Variable {
    pub fn ty(&self) -> Type {
        match self {
            Variable::Integer(_) => Type::Integer,
            Variable::Float(_) => Type::Float,
            Variable::Bool(_) => Type::Bool,
            Variable::String(_) => Type::String,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Integer(v) => write!(f, "{}", v),
            Variable::Float(v) => write!(f, "{}", v),
            Variable::Bool(v) => write!(f, "{}", v),
            Variable::String(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<i64> for Variable {
    fn from(v: i64) -> Self {
        Variable::Integer(v)
    }
}

impl From<i32> for Variable {
    fn from(v: i32) -> Self {
        Variable::Integer(v as i64)
    }
}

impl From<f64> for Variable {
    fn from(v: f64) -> Self {
        Variable::Float(v)
    }
}

impl From<bool> for Variable {
    fn from(v: bool) -> Self {
        Variable::Bool(v)
    }
}

impl From<&str> for Variable {
    fn from(v: &str) -> Self {
        Variable::String(v.to_string())
    }
}

impl From<String> for Variable {
    fn from(v: String) -> Self {
        Variable::String(v)
    }
}

/// 动态值入口：null / 数组 / 对象 均视为不支持的类型
impl TryFrom<serde_json::Value> for Variable {
    type Error = VariableError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value;
        match value {
            Value::Bool(b) => Ok(Variable::Bool(b)),
            Value::String(s) => Ok(Variable::String(s)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Variable::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Variable::Float(f))
                } else {
                    Err(VariableError::UnsupportedType(format!("number {}", n)))
                }
            }
            Value::Null => Err(VariableError::UnsupportedType("null".to_string())),
            Value::Array(_) => Err(VariableError::UnsupportedType("array".to_string())),
            Value::Object(_) => Err(VariableError::UnsupportedType("object".to_string())),
        }
    }
}

/// 单个变量声明
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableDecl {
    pub name: String,
    pub ty: Type,
    /// 默认值（declare_global 声明的变量没有默认值，扫描前必须绑定）
    pub default: Option<Variable>,
}

/// 变量声明表：按声明顺序分配索引
#[derive(Debug, Clone, Default)]
pub struct VariableSchema {
    decls: Vec<VariableDecl>,
    by_name: FxHashMap<String, usize>,
}

impl VariableSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// 校验变量名（合法标识符且非关键字）
    pub fn validate_identifier(name: &str) -> Result<(), VariableError> {
        let valid = IDENT_RE.as_ref().is_some_and(|re| re.is_match(name));
        if !valid || is_keyword(name) {
            return Err(VariableError::InvalidIdentifier(name.to_string()));
        }
        Ok(())
    }

    /// 新增声明；失败时表不变
    pub(crate) fn declare(
        &mut self,
        name: &str,
        ty: Type,
        default: Option<Variable>,
    ) -> Result<usize, VariableError> {
        Self::validate_identifier(name)?;
        if self.by_name.contains_key(name) {
            return Err(VariableError::AlreadyDeclared(name.to_string()));
        }
        let index = self.decls.len();
        self.decls.push(VariableDecl {
            name: name.to_string(),
            ty,
            default,
        });
        self.by_name.insert(name.to_string(), index);
        Ok(index)
    }

    pub fn get(&self, name: &str) -> Option<&VariableDecl> {
        self.index_of(name).map(|idx| &self.decls[idx])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn decl(&self, index: usize) -> Option<&VariableDecl> {
        self.decls.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariableDecl> {
        self.decls.iter()
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// 校验一次绑定：名称已声明且类型一致，返回索引
    pub fn validate(&self, name: &str, value: &Variable) -> Result<usize, VariableError> {
        let index = self
            .index_of(name)
            .ok_or_else(|| VariableError::Undeclared(name.to_string()))?;
        let expected = self.decls[index].ty;
        if value.ty() != expected {
            return Err(VariableError::TypeMismatch {
                name: name.to_string(),
                expected,
                actual: value.ty(),
            });
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_value_conversion() {
        assert_eq!(Variable::try_from(json!(1)).unwrap(), Variable::Integer(1));
        assert_eq!(Variable::try_from(json!(1.5)).unwrap(), Variable::Float(1.5));
        assert_eq!(Variable::try_from(json!(true)).unwrap(), Variable::Bool(true));
        assert_eq!(
            Variable::try_from(json!("abc")).unwrap(),
            Variable::String("abc".to_string())
        );
        // null / 数组 / 对象 不支持
        assert!(matches!(
            Variable::try_from(serde_json::Value::Null),
            Err(VariableError::UnsupportedType(_))
        ));
        assert!(matches!(
            Variable::try_from(json!([1, 2])),
            Err(VariableError::UnsupportedType(_))
        ));
        assert!(matches!(
            Variable::try_from(json!({"a": 1})),
            Err(VariableError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_schema_declare_and_validate() {
        let mut schema = VariableSchema::new();
        assert_eq!(schema.declare("some_int", Type::Integer, Some(1.into())).unwrap(), 0);
        assert_eq!(schema.declare("name", Type::String, None).unwrap(), 1);

        assert!(matches!(
            schema.declare("some_int", Type::Bool, None),
            Err(VariableError::AlreadyDeclared(_))
        ));
        assert!(matches!(
            schema.declare("1abc", Type::Bool, None),
            Err(VariableError::InvalidIdentifier(_))
        ));
        // 关键字不能作为变量名
        assert!(matches!(
            schema.declare("filesize", Type::Integer, None),
            Err(VariableError::InvalidIdentifier(_))
        ));
        assert_eq!(schema.len(), 2);

        assert_eq!(schema.validate("some_int", &Variable::Integer(5)).unwrap(), 0);
        assert!(matches!(
            schema.validate("some_int", &Variable::Bool(true)),
            Err(VariableError::TypeMismatch { .. })
        ));
        assert!(matches!(
            schema.validate("missing", &Variable::Bool(true)),
            Err(VariableError::Undeclared(_))
        ));
    }
}
