//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了目录实体（球会）、记录（球场）、缓存文档与运行元数据。
//!
//! 上游字段名在摄取时按固定的别名顺序解析一次，
//! 之后的过滤、体积检查与持久化只访问解析后的强类型字段。
//! 引擎不关心的其余属性原样保留在 `raw` 中并原样写回。

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// 上游字段别名，按优先级排列，首个存在的字段生效
pub mod aliases {
    pub const ENTITY_ID: &[&str] = &["ID", "Id", "id"];
    pub const ENTITY_NAME: &[&str] = &["Name", "name"];
    pub const RECORD_ID: &[&str] = &["ID", "Id", "id"];
    pub const TEMPLATE_ID: &[&str] = &["TemplateID", "TemplateId", "templateId"];
    pub const IS_ACTIVE: &[&str] = &["IsActive", "isActive", "Active"];
    pub const ACTIVATION_DATE: &[&str] = &["ActivationDate", "activationDate"];
}

/// 缓存文档中承载记录列表的字段名
pub const RECORDS_FIELD: &str = "courses";

/// 缺少名称的实体使用的显示名
pub const UNKNOWN_NAME: &str = "Unknown";

/// 摄取错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("missing identifier (tried {0:?})")]
    MissingId(&'static [&'static str]),
}

fn resolve<'a>(object: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| object.get(*name).filter(|v| !v.is_null()))
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 目录记录（球场 / 发球台布局的一个版本）
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: Option<String>,
    /// 模板标识，空字符串表示无模板，永不参与去重
    pub template_id: String,
    pub is_active: bool,
    /// 紧凑格式的激活时间，原样保存
    pub activation_date: Option<String>,
    raw: Map<String, Value>,
}

impl Record {
    /// 从上游 JSON 对象摄取记录
    pub fn from_value(value: Value) -> Result<Self, IngestError> {
        let raw = match value {
            Value::Object(map) => map,
            other => return Err(IngestError::NotAnObject(json_kind(&other))),
        };

        let id = resolve(&raw, aliases::RECORD_ID).and_then(value_as_id);
        let template_id = resolve(&raw, aliases::TEMPLATE_ID)
            .and_then(value_as_id)
            .unwrap_or_default();
        let is_active = matches!(resolve(&raw, aliases::IS_ACTIVE), Some(Value::Bool(true)));
        let activation_date = resolve(&raw, aliases::ACTIVATION_DATE)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            id,
            template_id,
            is_active,
            activation_date,
            raw,
        })
    }

    /// 上游原始属性
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Record::from_value(value).map_err(D::Error::custom)
    }
}

/// 目录实体（球会）
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: String,
    pub name: String,
    /// 除记录列表外的全部上游属性
    info: Map<String, Value>,
    pub records: Vec<Record>,
}

impl Entity {
    /// 从上游 JSON 对象摄取实体，任何已有的记录字段都会被剥离
    pub fn from_value(value: Value) -> Result<Self, IngestError> {
        let mut info = match value {
            Value::Object(map) => map,
            other => return Err(IngestError::NotAnObject(json_kind(&other))),
        };
        info.remove(RECORDS_FIELD);

        let id = resolve(&info, aliases::ENTITY_ID)
            .and_then(value_as_id)
            .ok_or(IngestError::MissingId(aliases::ENTITY_ID))?;
        let name = resolve(&info, aliases::ENTITY_NAME)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_NAME)
            .to_string();

        Ok(Self {
            id,
            name,
            info,
            records: Vec::new(),
        })
    }

    /// 替换记录列表
    pub fn with_records(mut self, records: Vec<Record>) -> Self {
        self.records = records;
        self
    }

    /// 不含记录的实体属性（即 info 文档）
    pub fn info(&self) -> &Map<String, Value> {
        &self.info
    }

    /// 实体连同记录的完整 JSON 形态，用于体积测量
    pub fn to_full_value(&self) -> Value {
        let mut full = self.info.clone();
        let records = self
            .records
            .iter()
            .map(|r| Value::Object(r.raw().clone()))
            .collect();
        full.insert(RECORDS_FIELD.to_string(), Value::Array(records));
        Value::Object(full)
    }

    /// 轻量列表条目
    pub fn summary(&self) -> ClubSummary {
        ClubSummary {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

/// 单个实体的缓存文档：info 与记录列表总是作为一个整体写入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedEntity {
    pub info: Map<String, Value>,
    pub courses: Vec<Record>,
    pub updated_at: DateTime<Utc>,
}

impl CachedEntity {
    /// 将实体拆分为 info + 记录文档
    pub fn split(entity: &Entity, updated_at: DateTime<Utc>) -> Self {
        Self {
            info: entity.info().clone(),
            courses: entity.records.clone(),
            updated_at,
        }
    }

    /// 文档键所用的实体标识
    pub fn entity_id(&self) -> Option<String> {
        resolve(&self.info, aliases::ENTITY_ID).and_then(value_as_id)
    }
}

/// 轻量实体列表条目，供客户端快速列出
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClubSummary {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
}

/// 最近一次更新的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    Full,
    Incremental,
    PendingFullReseed,
}

impl UpdateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateType::Full => "full",
            UpdateType::Incremental => "incremental",
            UpdateType::PendingFullReseed => "pending_full_reseed",
        }
    }
}

impl std::fmt::Display for UpdateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 缓存布局版本
pub const METADATA_VERSION: u32 = 2;

/// 运行元数据
///
/// 运行开始时读取一次以决定策略，成功运行结束时写入一次。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunMetadata {
    /// 最近一次成功播种时间，为空时强制全量刷新
    pub last_seeded: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_update_type: Option<UpdateType>,
    pub club_count: usize,
    pub course_count: usize,
    pub clubs_updated_last_run: usize,
    pub courses_updated_last_run: usize,
    pub clubs: Vec<ClubSummary>,
    pub version: u32,
}

impl Default for RunMetadata {
    fn default() -> Self {
        Self {
            last_seeded: None,
            last_updated: None,
            last_update_type: None,
            club_count: 0,
            course_count: 0,
            clubs_updated_last_run: 0,
            courses_updated_last_run: 0,
            clubs: Vec::new(),
            version: METADATA_VERSION,
        }
    }
}
