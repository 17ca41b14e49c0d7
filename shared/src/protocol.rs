/// mDNS service types browsed during a scan
pub const SMB_SERVICE_TYPE: &str = "_smb._tcp.local.";
pub const AFP_SERVICE_TYPE: &str = "_afpovertcp._tcp.local.";
pub const SFTP_SERVICE_TYPE: &str = "_sftp-ssh._tcp.local.";
pub const FTP_SERVICE_TYPE: &str = "_ftp._tcp.local.";
pub const IPP_SERVICE_TYPE: &str = "_ipp._tcp.local.";
pub const IPPS_SERVICE_TYPE: &str = "_ipps._tcp.local.";
pub const LPR_SERVICE_TYPE: &str = "_printer._tcp.local.";
pub const PDL_SERVICE_TYPE: &str = "_pdl-datastream._tcp.local.";

/// Apple mobile devices; instance names look like "aa:bb:cc:dd:ee:ff@fe80::1"
pub const MOBILE_SERVICE_TYPE: &str = "_apple-mobdev2._tcp.local.";

/// Printer protocols (domain-less, matched by substring)
pub const PRINTER_SERVICE_TYPES: [&str; 5] = [
    "_ipp._tcp",
    "_ipps._tcp",
    "_printer._tcp",
    "_pdl-datastream._tcp",
    "_fax-ipp._tcp",
];

/// API path prefix
pub const API_PREFIX: &str = "/v1";
