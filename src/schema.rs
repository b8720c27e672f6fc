// ==========================================
// 销售库存ETL系统 - 目标模式注册表
// ==========================================
// 职责: 声明式定义目标表结构/主键/外键/改名字典
// 红线: 只存元数据与纯函数查询,不含任何处理逻辑
// ==========================================

use std::collections::{HashMap, HashSet};

/// 规范日期格式（目标模式统一 年-月-日）
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// 收件文件批次的规范表名（扁平化订单行）
pub const ORDERS_TABLE: &str = "orders";

/// 列类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Float,
    Date,
}

impl ColumnType {
    /// 数值列（负值校验适用）
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }
}

/// 外键声明: 本表列 → 引用表.引用列(业务键)
#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub column: &'static str,
    pub ref_table: &'static str,
    pub ref_column: &'static str,
}

/// 单表模式声明
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: &'static str,

    /// 列名 → 类型
    pub columns: HashMap<&'static str, ColumnType>,

    /// 必填列集合
    pub required: HashSet<&'static str>,

    /// 业务键列（去重与水位线口径）
    pub business_key: Option<&'static str>,

    /// 是否对业务键执行批内/库内去重
    /// （订单批次一单多行,业务键天然重复,不去重）
    pub key_dedup: bool,

    /// 外键声明
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableSchema {
    /// 日期列集合
    pub fn date_columns(&self) -> Vec<&'static str> {
        let mut cols: Vec<&'static str> = self
            .columns
            .iter()
            .filter(|(_, t)| **t == ColumnType::Date)
            .map(|(c, _)| *c)
            .collect();
        cols.sort_unstable();
        cols
    }

    /// 数值列集合（Integer + Float）
    pub fn numeric_columns(&self) -> Vec<&'static str> {
        let mut cols: Vec<&'static str> = self
            .columns
            .iter()
            .filter(|(_, t)| t.is_numeric())
            .map(|(c, _)| *c)
            .collect();
        cols.sort_unstable();
        cols
    }

    /// 文本列集合（既非日期也非数值）
    pub fn text_columns(&self) -> Vec<&'static str> {
        let mut cols: Vec<&'static str> = self
            .columns
            .iter()
            .filter(|(_, t)| **t == ColumnType::Text)
            .map(|(c, _)| *c)
            .collect();
        cols.sort_unstable();
        cols
    }
}

/// 来源库表声明（嵌入式 SQLite）
#[derive(Debug, Clone)]
pub struct SourceTable {
    /// 来源侧表名
    pub name: &'static str,
    /// 来源侧主键列（水位线下界口径）
    pub id_column: &'static str,
}

// ==========================================
// SchemaRegistry - 模式注册表
// ==========================================
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    tables: HashMap<&'static str, TableSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        let mut tables = HashMap::new();

        // regions(id, name)
        tables.insert(
            "regions",
            TableSchema {
                name: "regions",
                columns: HashMap::from([
                    ("id", ColumnType::Integer),
                    ("name", ColumnType::Text),
                ]),
                required: HashSet::from(["id", "name"]),
                business_key: Some("id"),
                key_dedup: true,
                foreign_keys: vec![],
            },
        );

        // resellers(id, name, region_id -> regions.id)
        tables.insert(
            "resellers",
            TableSchema {
                name: "resellers",
                columns: HashMap::from([
                    ("id", ColumnType::Integer),
                    ("name", ColumnType::Text),
                    ("region_id", ColumnType::Integer),
                ]),
                required: HashSet::from(["id", "name", "region_id"]),
                business_key: Some("id"),
                key_dedup: true,
                foreign_keys: vec![ForeignKey {
                    column: "region_id",
                    ref_table: "regions",
                    ref_column: "id",
                }],
            },
        );

        // products(source_id, name, unit_cost) - 目标库另配代理键 id
        tables.insert(
            "products",
            TableSchema {
                name: "products",
                columns: HashMap::from([
                    ("source_id", ColumnType::Integer),
                    ("name", ColumnType::Text),
                    ("unit_cost", ColumnType::Float),
                ]),
                required: HashSet::from(["source_id", "name", "unit_cost"]),
                business_key: Some("source_id"),
                key_dedup: true,
                foreign_keys: vec![],
            },
        );

        // production(id, product_id -> products.source_id, quantity, date)
        tables.insert(
            "production",
            TableSchema {
                name: "production",
                columns: HashMap::from([
                    ("id", ColumnType::Integer),
                    ("product_id", ColumnType::Integer),
                    ("quantity", ColumnType::Integer),
                    ("date", ColumnType::Date),
                ]),
                required: HashSet::from(["id", "product_id", "quantity", "date"]),
                business_key: Some("id"),
                key_dedup: true,
                foreign_keys: vec![ForeignKey {
                    column: "product_id",
                    ref_table: "products",
                    ref_column: "source_id",
                }],
            },
        );

        // orders - 扁平化订单行批次(装载时拆分为 orders + order_lines)
        tables.insert(
            "orders",
            TableSchema {
                name: "orders",
                columns: HashMap::from([
                    ("order_number", ColumnType::Text),
                    ("date", ColumnType::Date),
                    ("reseller_id", ColumnType::Integer),
                    ("product_id", ColumnType::Integer),
                    ("quantity", ColumnType::Integer),
                    ("unit_price", ColumnType::Float),
                ]),
                required: HashSet::from([
                    "order_number",
                    "date",
                    "reseller_id",
                    "product_id",
                    "quantity",
                    "unit_price",
                ]),
                business_key: Some("order_number"),
                key_dedup: false,
                foreign_keys: vec![
                    ForeignKey {
                        column: "reseller_id",
                        ref_table: "resellers",
                        ref_column: "id",
                    },
                    ForeignKey {
                        column: "product_id",
                        ref_table: "products",
                        ref_column: "source_id",
                    },
                ],
            },
        );

        Self { tables }
    }

    /// 查询表模式
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    /// 来源库待抽取表清单
    pub fn source_tables(&self) -> Vec<SourceTable> {
        vec![
            SourceTable { name: "region", id_column: "region_id" },
            SourceTable { name: "reseller", id_column: "reseller_id" },
            SourceTable { name: "product", id_column: "product_id" },
            SourceTable { name: "production", id_column: "production_id" },
        ]
    }

    /// 来源表名 → 规范表名（未知表原名透传）
    pub fn canonical_table_name(&self, source: &str) -> String {
        match source {
            "region" => "regions".to_string(),
            "reseller" => "resellers".to_string(),
            "product" => "products".to_string(),
            other => other.to_string(),
        }
    }

    /// 规范表名 → 来源表名（水位线文件寻址用）
    pub fn source_table_name(&self, canonical: &str) -> String {
        match canonical {
            "regions" => "region".to_string(),
            "resellers" => "reseller".to_string(),
            "products" => "product".to_string(),
            other => other.to_string(),
        }
    }

    /// 嵌入式来源表的列改名字典（表改名后的规范表名 → 映射）
    pub fn column_renames(&self, canonical: &str) -> HashMap<&'static str, &'static str> {
        match canonical {
            "regions" => HashMap::from([
                ("region_id", "id"),
                ("region_name", "name"),
            ]),
            "resellers" => HashMap::from([
                ("reseller_id", "id"),
                ("reseller_name", "name"),
            ]),
            "products" => HashMap::from([
                ("product_id", "source_id"),
                ("product_name", "name"),
            ]),
            "production" => HashMap::from([
                ("production_id", "id"),
                ("date_production", "date"),
            ]),
            _ => HashMap::new(),
        }
    }

    /// 收件文件列名同义词 → 规范列名
    ///
    /// 入参须先经 normalize_header（去重音/小写/下划线）。
    /// 未命中的列名原样透传。
    pub fn canonical_column_name<'a>(&self, normalized: &'a str) -> &'a str {
        match normalized {
            // 订单号
            "numero_commande" | "numero_de_commande" | "num_commande" | "n°_commande"
            | "commande_numero" | "commande_num" | "order_number" | "order_no" | "cmd" => {
                "order_number"
            }
            // 订单日期
            "commande_date" | "date_commande" | "date_de_commande" | "order_date" | "date" => {
                "date"
            }
            // 经销商
            "revendeur_id" | "id_revendeur" | "revendeur" | "reseller_id" | "reseller" => {
                "reseller_id"
            }
            // 产品
            "product_id" | "id_produit" | "produit_id" | "produit" | "article_id" | "article" => {
                "product_id"
            }
            // 数量
            "quantity" | "quantite" | "qty" | "qte" => "quantity",
            // 单价
            "unit_price" | "prix_unitaire" | "prix" | "pu" | "price" => "unit_price",
            other => other,
        }
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 规范化表头: 去重音 → 小写 → 空格转下划线
pub fn normalize_header(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(fold_accent)
        .collect::<String>()
        .to_lowercase()
        .replace(' ', "_")
}

/// 常见拉丁重音字符折叠（法语数据源的表头变体）
fn fold_accent(c: char) -> char {
    match c {
        'à' | 'â' | 'ä' | 'á' | 'ã' => 'a',
        'À' | 'Â' | 'Ä' | 'Á' | 'Ã' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'î' | 'ï' | 'í' => 'i',
        'Î' | 'Ï' | 'Í' => 'I',
        'ô' | 'ö' | 'ó' | 'õ' => 'o',
        'Ô' | 'Ö' | 'Ó' | 'Õ' => 'O',
        'ù' | 'û' | 'ü' | 'ú' => 'u',
        'Ù' | 'Û' | 'Ü' | 'Ú' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        other => other,
    }
}
