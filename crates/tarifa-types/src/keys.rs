//! Well-known variable names available to tariff formulas.
//!
//! The names are the ones users write in formulas, so they stay in the
//! business vocabulary (Spanish) rather than the code's.

/// Unit rate taken from the route tariff
pub const VALOR: &str = "Valor";
/// Toll amount taken from the route tariff
pub const PEAJE: &str = "Peaje";
/// Pallet count (alias of [`PALETS`])
pub const CANTIDAD: &str = "Cantidad";
/// Pallet count
pub const PALETS: &str = "Palets";

/// Distance used by distance-based methods: route distance, else great-circle
pub const DISTANCIA: &str = "Distancia";
/// Distance recorded on the route
pub const DISTANCIA_REAL: &str = "DistanciaReal";
/// Great-circle distance between origin and destination
pub const DISTANCIA_AEREA: &str = "DistanciaAerea";

/// Weekday, 0 = Sunday .. 6 = Saturday
pub const DIA_SEMANA: &str = "DiaSemana";
/// Month, 1..=12
pub const MES: &str = "Mes";
/// Quarter, 1..=4
pub const TRIMESTRE: &str = "Trimestre";
/// Weekend flag
pub const ES_FIN_DE_SEMANA: &str = "EsFinDeSemana";
/// Holiday flag
pub const ES_FESTIVO: &str = "EsFestivo";
/// Hour of day, 0..=23
pub const HORA: &str = "Hora";
/// Calculation date
pub const FECHA: &str = "Fecha";

/// Requested unit (vehicle) type
pub const TIPO_UNIDAD: &str = "TipoUnidad";
/// Maximum pallet capacity of the unit type
pub const CAPACIDAD_MAXIMA: &str = "CapacidadMaxima";
/// Maximum weight of the unit type
pub const PESO_MAXIMO: &str = "PesoMaximo";
/// Number of vehicles
pub const CANTIDAD_VEHICULOS: &str = "CantidadVehiculos";

/// Client identifier
pub const CLIENTE_ID: &str = "ClienteId";
/// Client type
pub const TIPO_CLIENTE: &str = "TipoCliente";
/// Client category
pub const CATEGORIA_CLIENTE: &str = "CategoriaCliente";
/// Client discount percentage
pub const DESCUENTO_CLIENTE: &str = "DescuentoCliente";

/// Cargo weight
pub const PESO: &str = "Peso";
/// Cargo volume
pub const VOLUMEN: &str = "Volumen";
/// Cargo piece count
pub const CANTIDAD_BULTOS: &str = "CantidadBultos";
/// Cargo type
pub const TIPO_CARGA: &str = "TipoCarga";
/// Urgency level (`normal`, `urgente`, ...)
pub const URGENCIA: &str = "Urgencia";

/// Tramo type (e.g. `TRMC`, `TRMI`)
pub const TIPO_TRAMO: &str = "TipoTramo";
/// Sum of extra charges
pub const EXTRAS: &str = "Extras";

/// In-progress tariff during rule evaluation
pub const TARIFA: &str = "Tarifa";
/// In-progress total during rule evaluation
pub const TOTAL: &str = "Total";
/// Amount of the component a rule modifier targets
pub const MONTO: &str = "Monto";
