use super::{Column, RecordMapper, col, flag_key, renamed, text_key};

const AWG_COLUMNS: &[Column] = &[
    col("awg_id"),
    col("kennr"),
    col("antragnr"),
    col("awgnr"),
    col("anwendungsbereich"),
    col("anwendungstechnik"),
    col("einsatzgebiet"),
    col("wirkungsbereich"),
    col("anwendungen_anz_je_befall"),
    col("anwendungen_max_je_kultur"),
    col("anwendungen_max_je_vegetation"),
    col("stadium_kultur_von"),
    col("stadium_kultur_bis"),
    col("stadium_kultur_bem"),
    col("stadium_kultur_kodeliste"),
    col("stadium_schadorg_von"),
    col("stadium_schadorg_bis"),
    col("stadium_schadorg_bem"),
    col("stadium_schadorg_kodeliste"),
    col("kultur_erl"),
    col("schadorg_erl"),
    col("genehmigung"),
    col("huk"),
    col("aw_abstand_von"),
    col("aw_abstand_bis"),
    col("aw_abstand_einheit"),
];

const PARALLELIMPORT_COLUMNS: &[Column] = &[
    col("kennr"),
    text_key("parallelimport_kennr"),
    col("referenzmittel_kennr"),
    col("zul_ende"),
];

const VERTRIEB_COLUMNS: &[Column] = &[col("kennr"), col("vertriebsfirma_nr")];

const GHS_HINWEIS_COLUMNS: &[Column] = &[
    col("kennr"),
    col("hinweis_kode"),
    col("hinweis_text"),
    col("sortier_nr"),
];

pub(super) static MAPPERS: &[RecordMapper] = &[
    // core endpoints
    RecordMapper {
        endpoint: "stand",
        constants: &[("id", 1)],
        columns: &[renamed("stand", "datum"), col("hinweis")],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "mittel",
        constants: &[],
        columns: &[
            col("kennr"),
            col("mittelname"),
            col("formulierung_art"),
            col("zul_ende"),
            col("zul_erstmalig_am"),
        ],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "awg",
        constants: &[],
        columns: AWG_COLUMNS,
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "awg_kultur",
        constants: &[],
        columns: &[
            col("awg_id"),
            col("kultur"),
            flag_key("ausgenommen"),
            col("sortier_nr"),
        ],
        keep_payload: false,
    },
    RecordMapper {
        endpoint: "awg_schadorg",
        constants: &[],
        columns: &[
            col("awg_id"),
            col("schadorg"),
            flag_key("ausgenommen"),
            col("sortier_nr"),
        ],
        keep_payload: false,
    },
    RecordMapper {
        endpoint: "awg_aufwand",
        constants: &[],
        columns: &[
            col("awg_id"),
            text_key("aufwandbedingung"),
            col("sortier_nr"),
            col("m_aufwand"),
            col("m_aufwand_einheit"),
            col("w_aufwand_von"),
            col("w_aufwand_bis"),
            col("w_aufwand_einheit"),
        ],
        keep_payload: false,
    },
    RecordMapper {
        endpoint: "awg_wartezeit",
        constants: &[],
        columns: &[
            col("awg_wartezeit_nr"),
            col("awg_id"),
            col("kultur"),
            col("anwendungsbereich"),
            col("gesetzt_wartezeit"),
            col("gesetzt_wartezeit_bem"),
            col("erlaeuterung"),
            col("sortier_nr"),
        ],
        keep_payload: false,
    },
    RecordMapper {
        endpoint: "wirkstoff",
        constants: &[],
        columns: &[
            col("wirknr"),
            col("wirkstoffname"),
            col("wirkstoffname_en"),
            col("kategorie"),
            col("genehmigt"),
        ],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "wirkstoff_gehalt",
        constants: &[],
        columns: &[
            col("kennr"),
            col("wirknr"),
            col("wirkvar"),
            col("gehalt_rein"),
            col("gehalt_rein_grundstruktur"),
            col("gehalt_einheit"),
            col("gehalt_bio"),
            col("gehalt_bio_einheit"),
        ],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "mittel_vertrieb",
        constants: &[],
        columns: VERTRIEB_COLUMNS,
        keep_payload: false,
    },
    // extended endpoints
    RecordMapper {
        endpoint: "adresse",
        constants: &[],
        columns: &[
            col("adresse_nr"),
            col("name"),
            col("strasse"),
            col("plz"),
            col("ort"),
            col("land"),
            col("telefon"),
            col("telefax"),
            col("email"),
            col("internet"),
        ],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "antrag",
        constants: &[],
        columns: &[
            col("kennr"),
            col("antragnr"),
            col("antragsteller_nr"),
            col("zulassungsinhaber_nr"),
            col("zulassungsnummer"),
            col("zulassungsdatum"),
            col("zul_ende"),
        ],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "auflage_redu",
        constants: &[],
        columns: &[
            col("auflagenr"),
            col("auflage"),
            col("auflage_abstand_redu"),
            col("auflage_abstand_redu_bem"),
        ],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "auflagen",
        constants: &[],
        columns: &[
            col("kennr"),
            col("antragnr"),
            col("awg_id"),
            col("ebene"),
            col("auflagenr"),
            col("auflage"),
        ],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "awg_bem",
        constants: &[],
        columns: &[col("awg_id"), col("bem"), col("sortier_nr")],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "awg_partner",
        constants: &[],
        columns: &[
            col("awg_id"),
            col("kennr_partner"),
            col("partner_typ"),
            col("partner_bedingung"),
            col("sortier_nr"),
        ],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "awg_partner_aufwand",
        constants: &[],
        columns: &[
            col("awg_id"),
            col("kennr_partner"),
            text_key("aufwandbedingung"),
            col("sortier_nr"),
            col("m_aufwand"),
            col("m_aufwand_einheit"),
        ],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "awg_verwendungszweck",
        constants: &[],
        columns: &[col("awg_id"), col("verwendungszweck"), col("sortier_nr")],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "awg_wartezeit_ausg_kultur",
        constants: &[],
        columns: &[col("awg_wartezeit_nr"), col("kultur"), col("sortier_nr")],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "awg_zeitpunkt",
        constants: &[],
        columns: &[col("awg_id"), col("zeitpunkt"), col("sortier_nr")],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "awg_zulassung",
        constants: &[],
        columns: &[
            col("awg_id"),
            col("zulassungsanfang"),
            col("zulassungsende"),
            col("aufbrauchfrist"),
        ],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "ghs_gefahrenhinweise",
        constants: &[],
        columns: GHS_HINWEIS_COLUMNS,
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "ghs_gefahrensymbole",
        constants: &[],
        columns: &[
            col("kennr"),
            col("symbol_kode"),
            col("symbol_text"),
            col("sortier_nr"),
        ],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "ghs_sicherheitshinweise",
        constants: &[],
        columns: GHS_HINWEIS_COLUMNS,
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "ghs_signalwoerter",
        constants: &[],
        columns: &[col("kennr"), col("signalwort")],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "hinweis",
        constants: &[],
        columns: &[
            col("kennr"),
            col("hinweis_art"),
            col("hinweis"),
            col("sortier_nr"),
        ],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "kodeliste",
        constants: &[],
        columns: &[
            col("kodeliste_nr"),
            col("kodeliste_name"),
            col("kodeliste_bem"),
        ],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "kodeliste_feldname",
        constants: &[],
        columns: &[col("feld"), col("kodeliste_nr")],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "kode",
        constants: &[],
        columns: &[
            col("kodeliste"),
            col("kode"),
            col("sprache"),
            col("kodetext"),
            col("kodetext2"),
        ],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "kultur_gruppe",
        constants: &[],
        columns: &[col("gruppe"), col("kultur"), col("sortier_nr")],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "mittel_abgelaufen",
        constants: &[],
        columns: &[
            col("kennr"),
            col("mittelname"),
            col("zul_ende"),
            col("aufbrauchfrist"),
        ],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "mittel_abpackung",
        constants: &[],
        columns: &[
            col("kennr"),
            col("abpackung_menge"),
            col("abpackung_einheit"),
            col("sortier_nr"),
        ],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "mittel_gefahren_symbol",
        constants: &[],
        columns: &[col("kennr"), col("gefahren_symbol"), col("sortier_nr")],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "mittel_wirkbereich",
        constants: &[],
        columns: &[col("kennr"), col("wirkbereich"), col("sortier_nr")],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "parallelimport_abgelaufen",
        constants: &[],
        columns: PARALLELIMPORT_COLUMNS,
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "parallelimport_gueltig",
        constants: &[],
        columns: PARALLELIMPORT_COLUMNS,
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "schadorg_gruppe",
        constants: &[],
        columns: &[col("gruppe"), col("schadorg"), col("sortier_nr")],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "staerkung",
        constants: &[],
        columns: &[
            col("kennr"),
            col("mittelname"),
            col("antragsteller_nr"),
            col("listung_ende"),
        ],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "staerkung_vertrieb",
        constants: &[],
        columns: VERTRIEB_COLUMNS,
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "zusatzstoff",
        constants: &[],
        columns: &[
            col("kennr"),
            col("mittelname"),
            col("antragsteller_nr"),
            col("zul_ende"),
        ],
        keep_payload: true,
    },
    RecordMapper {
        endpoint: "zusatzstoff_vertrieb",
        constants: &[],
        columns: VERTRIEB_COLUMNS,
        keep_payload: true,
    },
];
