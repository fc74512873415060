//! Static lookup tables maintained by hand alongside the pipeline.
//!
//! All of these are loaded once and injected by reference into the
//! components that need them, so tests can substitute their own tables.
//! The built-in defaults mirror the regulator's published naming and
//! indicator taxonomy.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Rules for reducing raw reported institution names to one canonical name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameRules {
    /// Legal-form prefixes stripped case-insensitively (first match wins).
    pub legal_prefixes: Vec<String>,
    /// Long-form legal suffix token replaced by `abbreviated_suffix`.
    pub long_suffix: String,
    pub abbreviated_suffix: String,
    /// Known historical renamings, typos and truncations.
    pub corrections: BTreeMap<String, String>,
    /// Short codes used by one source for mutual institutions, mapped to the
    /// canonical long name. Applied only to rows whose tier carries the
    /// mutual marker, so unrelated entities sharing a short code are safe.
    pub short_codes: BTreeMap<String, String>,
}

impl Default for NameRules {
    fn default() -> Self {
        let legal_prefixes = vec![
            "COOPERATIVA DE AHORRO Y CREDITO ".to_string(),
            "COOPERATIVA DE AHORRO Y CRÉDITO ".to_string(),
            "COOP. DE AHORRO Y CREDITO ".to_string(),
        ];

        let corrections = [
            (
                "ALFONSO JARAMILLO LEON CCC",
                "ALFONSO JARAMILLO LEON CAJA",
            ),
            ("FERNANDO DAQUILEMA", "FERNANDO DAQUILEMA LTDA"),
            (
                "VISION DE LOS ANDES VISANDES",
                "VISION DE LOS ANDES VIS ANDES",
            ),
            ("EDUCADORES DE LOJA LTDA", "EDUCADORES DE LOJA - CACEL LTDA"),
            ("SUMAK SISA", "SISA"),
            (
                "DE LA PEQUENA EMPRESA CACPE ZAMORA LTDA",
                "DE LA PEQUEÑA EMPRESA CACPE ZAMORA CHINCHIPE LTDA",
            ),
            (
                "CAMARA DE COMERCIO DE SANTO DOMINGO EN LIQUIDACION",
                "CAMARA DE COMERCIO DE SANTO DOMINGO",
            ),
            (
                "PARA LA VIVIENDA ORDEN Y SEGURIDAD",
                "ORDEN Y SEGURIDAD \"OYS\"",
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let short_codes = [
            ("AMBATO", "Mutualista Ambato"),
            ("AZUAY", "Mutualista Azuay"),
            ("IMBABURA", "Mutualista Imbabura"),
            ("PICHINCHA", "Mutualista Pichincha"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            legal_prefixes,
            long_suffix: " LIMITADA".to_string(),
            abbreviated_suffix: " LTDA".to_string(),
            corrections,
            short_codes,
        }
    }
}

/// One entry of the source-field → indicator taxonomy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorMapping {
    pub code: String,
    pub label: String,
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub names: NameRules,
    /// Inter-cooperative clearing-house entities excluded from every extract.
    pub ignore_institutions: Vec<String>,
    /// Field names whose presence (at least two) identifies the cached
    /// pivot-table block holding regulatory ratios.
    pub indicator_markers: BTreeSet<String>,
    /// Source pivot field → stable indicator identity; unmapped fields drop.
    pub indicators: BTreeMap<String, IndicatorMapping>,
    /// Level-1 account codes admitted as hierarchy roots.
    pub valid_root_codes: BTreeSet<String>,
    /// Account-code prefixes selecting income-statement rows.
    pub income_code_prefixes: Vec<char>,
    /// Display labels for the 1- and 2-digit income-statement codes, used
    /// when a source row carries a blank label.
    pub income_summary_labels: BTreeMap<String, String>,
}

impl PipelineConfig {
    /// Loads a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn indicator_for(&self, source_field: &str) -> Option<&IndicatorMapping> {
        self.indicators.get(source_field)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            names: NameRules::default(),
            ignore_institutions: vec!["CONAFIPS".to_string(), "FINANCOOP".to_string()],
            indicator_markers: [
                "I28_ROE",
                "I29_ROA",
                "I1_suficiencia_patrimonial",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            indicators: default_indicator_taxonomy(),
            valid_root_codes: ["1", "2", "3", "4", "5", "6", "7"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            income_code_prefixes: vec!['4', '5'],
            income_summary_labels: default_income_summary_labels(),
        }
    }
}

fn default_income_summary_labels() -> BTreeMap<String, String> {
    [
        ("5", "INGRESOS"),
        ("51", "INTERESES Y DESCUENTOS GANADOS"),
        ("52", "COMISIONES GANADAS"),
        ("53", "UTILIDADES FINANCIERAS"),
        ("54", "INGRESOS POR SERVICIOS"),
        ("55", "OTROS INGRESOS OPERACIONALES"),
        ("56", "OTROS INGRESOS"),
        ("4", "GASTOS"),
        ("41", "INTERESES CAUSADOS"),
        ("42", "COMISIONES CAUSADAS"),
        ("43", "PERDIDAS FINANCIERAS"),
        ("44", "PROVISIONES"),
        ("45", "GASTOS DE OPERACION"),
        ("46", "OTRAS PERDIDAS OPERACIONALES"),
        ("47", "OTROS GASTOS Y PERDIDAS"),
        ("48", "IMPUESTOS Y PARTICIPACION A EMPLEADOS"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Analytical category labels for the indicator taxonomy.
pub mod category {
    pub const CAPITAL: &str = "C - Capital";
    pub const ASSET_QUALITY: &str = "A - Calidad de Activos";
    pub const DELINQUENCY: &str = "A - Morosidad";
    pub const COVERAGE: &str = "A - Cobertura";
    pub const MANAGEMENT: &str = "M - Management";
    pub const EARNINGS: &str = "E - Earnings";
    pub const LIQUIDITY: &str = "L - Liquidez";
    pub const VULNERABILITY: &str = "V - Vulnerabilidad";
}

fn default_indicator_taxonomy() -> BTreeMap<String, IndicatorMapping> {
    use category::*;

    let entries: &[(&str, &str, &str, &str)] = &[
        (
            "I1_suficiencia_patrimonial",
            "SUF_PAT",
            "(Patrimonio + Resultados) / Activos Inmovilizados",
            CAPITAL,
        ),
        (
            "I2_prop_act_impr_net",
            "ACT_IMPR",
            "Activos Improductivos Netos / Total Activos",
            ASSET_QUALITY,
        ),
        (
            "I3_prop_act_prod_net",
            "ACT_PROD",
            "Activos Productivos / Total Activos",
            ASSET_QUALITY,
        ),
        (
            "I4_uti_pas_cost_prod_gene",
            "AP_PC",
            "Activos Productivos / Pasivos con Costo",
            ASSET_QUALITY,
        ),
        ("I5_Moros_carte", "MOR_TOT", "Morosidad Total", DELINQUENCY),
        (
            "Moros_carte_consu",
            "MOR_CONS",
            "Morosidad Consumo",
            DELINQUENCY,
        ),
        (
            "I8_Moros_carte_inmob",
            "MOR_INMOB",
            "Morosidad Inmobiliaria",
            DELINQUENCY,
        ),
        (
            "I9_Moros_carte_micro",
            "MOR_MICRO",
            "Morosidad Microcrédito",
            DELINQUENCY,
        ),
        (
            "I10_Moros_carte_produ",
            "MOR_PROD",
            "Morosidad Productivo",
            DELINQUENCY,
        ),
        (
            "I13_Moros_carte_vivi_ip",
            "MOR_VIV_IP",
            "Morosidad Vivienda Interés Público",
            DELINQUENCY,
        ),
        (
            "I14_Moros_carte_educ",
            "MOR_EDU",
            "Morosidad Educativo",
            DELINQUENCY,
        ),
        ("I15_Cober_carte", "COB_TOT", "Cobertura Total", COVERAGE),
        (
            "Cober_carte_consu",
            "COB_CONS",
            "Cobertura Consumo",
            COVERAGE,
        ),
        (
            "I18_Cober_carte_inmob",
            "COB_INMOB",
            "Cobertura Inmobiliaria",
            COVERAGE,
        ),
        (
            "I19_Cober_carte_micro",
            "COB_MICRO",
            "Cobertura Microcrédito",
            COVERAGE,
        ),
        (
            "I20_Cober_carte_produ",
            "COB_PROD",
            "Cobertura Productivo",
            COVERAGE,
        ),
        (
            "I23_Cober_carte_vivi_ip",
            "COB_VIV_IP",
            "Cobertura Vivienda Interés Público",
            COVERAGE,
        ),
        (
            "I24_Cober_carte_educ",
            "COB_EDU",
            "Cobertura Educativo",
            COVERAGE,
        ),
        (
            "I25_Efici_opera",
            "GO_ACT",
            "Gastos Operación / Activo Promedio",
            MANAGEMENT,
        ),
        (
            "I26_Grad_abso",
            "GO_MNF",
            "Gastos Operación / Margen Financiero",
            MANAGEMENT,
        ),
        (
            "I27_Efic_adm_pers",
            "GP_ACT",
            "Gastos Personal / Activo Promedio",
            MANAGEMENT,
        ),
        ("I28_ROE", "ROE", "ROE", EARNINGS),
        ("I29_ROA", "ROA", "ROA", EARNINGS),
        (
            "I30_Interm_fin",
            "INTERM",
            "Intermediación Financiera",
            EARNINGS,
        ),
        (
            "I31_Marg_inter_est_patri",
            "MARG_PAT",
            "Margen Intermediación / Patrimonio",
            EARNINGS,
        ),
        (
            "I32_Marg_inter_est_activ",
            "MARG_ACT",
            "Margen Intermediación / Activo",
            EARNINGS,
        ),
        (
            "I34_Rend_cart_consu_x_venc",
            "REND_CONS",
            "Rendimiento Cartera Consumo",
            EARNINGS,
        ),
        (
            "I35_Rend_cart_inmob_x_venc",
            "REND_INMOB",
            "Rendimiento Cartera Inmobiliaria",
            EARNINGS,
        ),
        (
            "I36_Rend_cart_micro_x_venc",
            "REND_MICRO",
            "Rendimiento Cartera Microcrédito",
            EARNINGS,
        ),
        (
            "I37_Rend_cart_prod_x_venc",
            "REND_PROD",
            "Rendimiento Cartera Productivo",
            EARNINGS,
        ),
        (
            "I40_Rend_cart_vivie_x_venc",
            "REND_VIV",
            "Rendimiento Cartera Vivienda IP",
            EARNINGS,
        ),
        (
            "I41_Rend_cart_educ_x_venc",
            "REND_EDU",
            "Rendimiento Cartera Educativo",
            EARNINGS,
        ),
        (
            "I42_Cart_cred_ref_xven",
            "CART_REF",
            "Carteras de Créditos Refinanciadas",
            ASSET_QUALITY,
        ),
        (
            "I43_Cart_cred_reest",
            "CART_REEST",
            "Carteras de Créditos Reestructuradas",
            ASSET_QUALITY,
        ),
        (
            "I44_cartera_x_vencer",
            "CART_VENCER",
            "Cartera por Vencer Total",
            ASSET_QUALITY,
        ),
        (
            "I45_Fond_dis_sob_total_depo_cort_plz",
            "LIQ",
            "Fondos Disponibles / Depósitos CP",
            LIQUIDITY,
        ),
        (
            "I46_Carte_impro_descu_rela_patri_resul",
            "VULN_PAT",
            "Cart. Improd. Descubierta / Patrimonio",
            VULNERABILITY,
        ),
        (
            "I47_Carte_impr_patri_dic",
            "CART_IMPR_PAT",
            "Cartera Improductiva / Patrimonio",
            VULNERABILITY,
        ),
        ("I48_FK", "FK", "FK", VULNERABILITY),
        ("I49_FI", "FI", "FI", VULNERABILITY),
        (
            "I50_Indi_capi_neto",
            "CAP_NETO",
            "Índice Capitalización Neto",
            VULNERABILITY,
        ),
    ];

    entries
        .iter()
        .map(|(field, code, label, cat)| {
            (
                field.to_string(),
                IndicatorMapping {
                    code: code.to_string(),
                    label: label.to_string(),
                    category: cat.to_string(),
                },
            )
        })
        .collect()
}
