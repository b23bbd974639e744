//! # Built-in Feed Catalog
//!
//! Table specs of the feeds the ERP integration ships with, keyed by feed
//! code. A `[[feeds]]` entry in the config picks one of these by code or
//! supplies its own table spec.
//!
//! ```text
//! ┌──────────┬──────────────┬───────────────────────────────────────────┐
//! │ Code     │ Table        │ Key                                       │
//! ├──────────┼──────────────┼───────────────────────────────────────────┤
//! │ ENT-02   │ KR_GECOUST   │ key → ENT01   (EVRAKNO = 'STUNIT')        │
//! │ ENT-03   │ KR_PERS00    │ key → ENT01                               │
//! │ ENT-04   │ KR_IMLT00    │ key → ENT01                               │
//! │ ENT-05   │ KR_IMLT01    │ key → ENT01                               │
//! │ ENT-06   │ KR_GDEF00    │ key → ENT01                               │
//! │ ENT-07   │ KR_CARI00    │ key → ENT01                               │
//! │ ENT-08   │ KR_BOMU01E   │ key → ENT01                               │
//! │ ENT-09   │ KR_BOMU01T   │ 5 fields → ENT01..ENT05                   │
//! │ ENT-10   │ KR_STOK40E   │ key → ENT01                               │
//! │ ENT-11   │ KR_STOK40T   │ satirkey → ENT01                          │
//! │ ENT-12   │ KR_STOK00    │ kodkey → ENT01                            │
//! └──────────┴──────────────┴───────────────────────────────────────────┘
//! ```

use crate::spec::TableSpec;

/// Join column shared by every single-key table.
pub const JOIN_COLUMN: &str = "ENT01";

/// Codes with a built-in spec, in catalog order.
pub const BUILTIN_CODES: &[&str] = &[
    "ENT-02", "ENT-03", "ENT-04", "ENT-05", "ENT-06", "ENT-07", "ENT-08", "ENT-09", "ENT-10",
    "ENT-11", "ENT-12",
];

/// Display title of a built-in feed.
pub fn builtin_title(code: &str) -> Option<&'static str> {
    let title = match code {
        "ENT-02" => "System stock units",
        "ENT-03" => "Personnel",
        "ENT-04" => "Production definitions",
        "ENT-05" => "Production sub-definitions",
        "ENT-06" => "General definitions",
        "ENT-07" => "Current accounts",
        "ENT-08" => "Bill of materials headers",
        "ENT-09" => "Bill of materials lines",
        "ENT-10" => "Order headers",
        "ENT-11" => "Order lines",
        "ENT-12" => "Stock cards",
        _ => return None,
    };
    Some(title)
}

/// Returns the built-in table spec for a feed code.
pub fn builtin_spec(code: &str) -> Option<TableSpec> {
    let spec = match code {
        "ENT-02" => TableSpec::single("KR_GECOUST", "key", JOIN_COLUMN)
            .text("KOD", "kod")
            .text("AD", "aciklama")
            .constant("AP10", 1i64)
            .partitioned("EVRAKNO", "STUNIT"),

        "ENT-03" => TableSpec::single("KR_PERS00", "key", JOIN_COLUMN)
            .text("KOD", "kod")
            .text("AD", "aciklama")
            .text("REFTEXT01", "tezgah_kodu"),

        "ENT-04" => simple("KR_IMLT00"),
        "ENT-05" => simple("KR_IMLT01"),
        "ENT-06" => simple("KR_GDEF00"),
        "ENT-07" => simple("KR_CARI00"),

        "ENT-08" => TableSpec::single("KR_BOMU01E", "key", JOIN_COLUMN)
            .text("EVRAKNO", "kod")
            .text("ACIKLAMA", "aciklama")
            .text("AKTIF_PASIF", "durum")
            .text("ENT02", "mamulkey")
            .number("MAMULMIKTAR", "mamulmiktar")
            .text("MAMULCODE", "mamulkod"),

        "ENT-09" => TableSpec::composite(
            "KR_BOMU01T",
            &[
                ("evraknokey", "ENT01"),
                ("bomreccodekey", "ENT02"),
                ("bomreckaynakcodekey", "ENT03"),
                ("bomrecoperasyonkey", "ENT04"),
                ("tuketimtezgahkey", "ENT05"),
            ],
        )
        .text("EVRAKNO", "evrakno")
        .text("AKTIF_PASIF", "durum")
        .text("BOMREC_CODE", "bomreccode")
        .text("BOMREC_INPUTTYPE", "bomrecinputtype")
        .text("BOMREC_KAYNAKCODE", "bomreckaynakcode")
        .number("BOMREC_MAMULMIKTAR", "bomrecmamulmiktar")
        .text("BOMREC_KAYNAK0", "bomreckaynak0")
        .text("BOMREC_OPERASYON", "bomrecoperasyon")
        .text("REFTEXT01", "tuketimtezgah"),

        "ENT-10" => TableSpec::single("KR_STOK40E", "key", JOIN_COLUMN)
            .text("EVRAKNO", "kod")
            .text("TARIH", "tarih")
            .text("ISLEM_SAATI", "saat")
            .text("SIPLEILGILINOTLAR_1", "a1")
            .text("SIPLEILGILINOTLAR_2", "a2")
            .text("SIPLEILGILINOTLAR_3", "a3")
            .text("ENT02", "keycari")
            .text("MUSTERIKODU", "carikod"),

        "ENT-11" => TableSpec::single("KR_STOK40T", "satirkey", JOIN_COLUMN)
            .text("ENT02", "evraknokey")
            .text("EVRAKNO", "evrakno")
            .text("TARIH", "tarih")
            .text("ENT03", "kodkey")
            .text("KOD", "kod")
            .text("NOTES", "notes")
            .text("OR_FIYAT", "orfiyat")
            .text("PRICEUNIT", "priceunit")
            .text("OR_TUTAR", "ortutar")
            .text("SF_MIKTAR", "sfmiktar")
            .text("ENT04", "sfsfunitkey")
            .text("ENT05", "sistembirimkey")
            .text("SF_SF_UNIT", "sfsfunit")
            .text("SF_STOK_MIKTAR", "sfstokmiktar")
            .text("RTESTARIH", "rtestarih"),

        "ENT-12" => TableSpec::single("KR_STOK00", "kodkey", JOIN_COLUMN)
            .text("KOD", "kod")
            .text("AD", "ad")
            .text("ENT02", "iunitstokkey")
            .text("ENT03", "iunitsistemkey")
            .text("IUNIT", "iunit"),

        _ => return None,
    };
    Some(spec)
}

fn simple(table: &str) -> TableSpec {
    TableSpec::single(table, "key", JOIN_COLUMN)
        .text("KOD", "kod")
        .text("AD", "aciklama")
}
